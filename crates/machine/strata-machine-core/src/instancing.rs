//! Motion-node graph instantiation: turn the shared controller prototype
//! into a private, self-consistent runtime graph for one layer instance.
//!
//! The prototype is reference-only; every instantiation produces a freshly
//! owned, densely indexed array, then re-establishes the "one owner per
//! playback cursor" invariant: cyclic branches are nulled out, and any node
//! referenced by two parents (or claimed by two states) is cloned for the
//! second referencer. All failures degrade in place — a broken branch must
//! not stop the rest of the character from animating.

use hashbrown::HashMap;

use crate::config::Config;
use crate::data::{ControllerDef, LayerDef};
use crate::ids::{LayerId, MotionId, NodeIndex};
use crate::motion::MotionNode;
use crate::outputs::{MachineEvent, Outputs};
use crate::state::RuntimeState;
use crate::transition::Transition;

/// Instantiate one layer's motion graph and state array from the prototype.
pub(crate) fn instantiate_graph(
    controller: &ControllerDef,
    layer_def: &LayerDef,
    layer: LayerId,
    config: &Config,
    outputs: &mut Outputs,
) -> (Vec<Option<MotionNode>>, Vec<RuntimeState>) {
    // 1) Identifier resolution: top-level ids keep their relative order;
    // nested children are appended to the flat worklist as discovered.
    let mut worklist: Vec<MotionId> = Vec::with_capacity(layer_def.motions.len());
    for id in &layer_def.motions {
        push_resolved(controller, layer_def, *id, &mut worklist);
    }
    let mut cursor = 0;
    while cursor < worklist.len() {
        let id = worklist[cursor];
        cursor += 1;
        if let Some(def) = controller.motion(id) {
            for child in def.child_ids() {
                push_resolved(controller, layer_def, child, &mut worklist);
            }
        }
    }

    // 2) Clone pass: one runtime node per resolved id, then rewrite every
    // child reference through the old-id -> new-index remap table.
    let mut remap: HashMap<u32, u32> = HashMap::with_capacity(worklist.len());
    for (i, id) in worklist.iter().enumerate() {
        remap.insert(id.0, i as u32);
    }
    let mut nodes: Vec<Option<MotionNode>> = worklist
        .iter()
        .map(|id| controller.motion(*id).map(MotionNode::from_def))
        .collect();
    for node in nodes.iter_mut().flatten() {
        node.remap_children(|old| remap.get(&old.0).map(|&i| NodeIndex(i)));
    }

    // 3) Cycle rejection: a node whose subtree revisits an index on the
    // active DFS path is cyclic; its slot is nulled and the layer carries on
    // without that branch.
    let mut on_path = vec![false; nodes.len()];
    let cyclic: Vec<usize> = (0..nodes.len())
        .filter(|&i| {
            nodes[i]
                .as_ref()
                .is_some_and(|n| !n.child_indices().is_empty())
                && subtree_revisits(&nodes, NodeIndex(i as u32), &mut on_path)
        })
        .collect();
    for i in cyclic {
        log::warn!(
            "layer '{}': cyclic motion-node reference at index {i}; branch dropped",
            layer_def.name
        );
        outputs.push_event(MachineEvent::CycleDetected {
            layer,
            node: NodeIndex(i as u32),
        });
        nodes[i] = None;
    }

    // Resolve state roots before dedup so they participate in ownership.
    let mut roots: Vec<Option<NodeIndex>> = layer_def
        .states
        .iter()
        .map(|s| {
            s.motion.and_then(|id| match remap.get(&id.0) {
                Some(&i) => Some(NodeIndex(i)),
                None => {
                    log::warn!(
                        "layer '{}': state '{}' references missing motion {:?}",
                        layer_def.name,
                        s.name,
                        id
                    );
                    None
                }
            })
        })
        .collect();

    // 4+5) Reference and state-root deduplication to a fixpoint, bounded by
    // the configured pass ceiling. On overflow the pre-dedup backup is kept:
    // a shared cursor is preferable to unbounded array growth.
    let backup_nodes = nodes.clone();
    let backup_roots = roots.clone();
    let mut settled = false;
    for _ in 0..config.max_dedup_passes {
        let shared = dedup_shared_children(&mut nodes, &roots);
        let claimed = dedup_state_roots(&mut nodes, &mut roots);
        if !shared && !claimed {
            settled = true;
            break;
        }
    }
    if !settled {
        log::error!(
            "layer '{}': reference deduplication exceeded {} passes; keeping shared graph",
            layer_def.name,
            config.max_dedup_passes
        );
        outputs.push_event(MachineEvent::DuplicationOverflow { layer });
        nodes = backup_nodes;
        roots = backup_roots;
    }

    // 6) Initialization: acquire playback state and apply loop modes.
    for node in nodes.iter_mut().flatten() {
        node.initialize();
    }

    // Build runtime states; structurally bad edges are disabled, not fatal.
    let state_count = layer_def.states.len();
    let states: Vec<RuntimeState> = layer_def
        .states
        .iter()
        .enumerate()
        .map(|(index, def)| {
            let transitions = def
                .transitions
                .iter()
                .map(|tdef| {
                    let mut tr = Transition::new(tdef.clone());
                    if tdef.target == index {
                        log::warn!(
                            "layer '{}': state '{}' has a self-targeting transition; disabled",
                            layer_def.name,
                            def.name
                        );
                        outputs.push_event(MachineEvent::SelfTransition { layer, state: index });
                        tr.disabled = true;
                    } else if tdef.target >= state_count {
                        log::warn!(
                            "layer '{}': state '{}' transition targets missing state {}; disabled",
                            layer_def.name,
                            def.name,
                            tdef.target
                        );
                        outputs.push_event(MachineEvent::MissingTransitionTarget {
                            layer,
                            state: index,
                            target: tdef.target,
                        });
                        tr.disabled = true;
                    }
                    tr
                })
                .collect();
            RuntimeState {
                name: def.name.clone(),
                index,
                node: roots[index],
                transitions,
                active: None,
                weight: 0.0,
            }
        })
        .collect();

    (nodes, states)
}

fn push_resolved(
    controller: &ControllerDef,
    layer_def: &LayerDef,
    id: MotionId,
    worklist: &mut Vec<MotionId>,
) {
    if worklist.contains(&id) {
        return;
    }
    if controller.motion(id).is_none() {
        log::warn!(
            "layer '{}': motion {:?} missing from controller '{}'",
            layer_def.name,
            id,
            controller.name
        );
        return;
    }
    worklist.push(id);
}

/// Depth-first walk accumulating the active path; true if the subtree
/// revisits an index already on it.
fn subtree_revisits(
    nodes: &[Option<MotionNode>],
    index: NodeIndex,
    on_path: &mut [bool],
) -> bool {
    let i = index.usize();
    if i >= nodes.len() {
        return false;
    }
    if on_path[i] {
        return true;
    }
    let children = match &nodes[i] {
        Some(n) => n.child_indices(),
        None => return false,
    };
    on_path[i] = true;
    let mut revisits = false;
    for child in children {
        if subtree_revisits(nodes, child, on_path) {
            revisits = true;
            break;
        }
    }
    on_path[i] = false;
    revisits
}

/// One pass of reference dedup: the first referencer of an index reserves
/// it (state roots reserve up front); every further referencer gets an
/// appended clone. Clones appended here are scanned on the next pass, which
/// is what makes the loop iterative.
fn dedup_shared_children(
    nodes: &mut Vec<Option<MotionNode>>,
    roots: &[Option<NodeIndex>],
) -> bool {
    let mut changed = false;
    let mut referenced = vec![false; nodes.len()];
    for root in roots.iter().flatten() {
        if root.usize() < referenced.len() {
            referenced[root.usize()] = true;
        }
    }
    let parents = nodes.len();
    for parent in 0..parents {
        let children = match &nodes[parent] {
            Some(n) => n.child_indices(),
            None => continue,
        };
        for child in children {
            let c = child.usize();
            if c >= nodes.len() || nodes[c].is_none() {
                continue;
            }
            if !referenced[c] {
                referenced[c] = true;
            } else {
                let clone = nodes[c].clone();
                let new_index = NodeIndex(nodes.len() as u32);
                nodes.push(clone);
                referenced.push(true);
                if let Some(p) = nodes[parent].as_mut() {
                    p.remap_one_child(child, new_index);
                }
                changed = true;
            }
        }
    }
    changed
}

/// State-to-node dedup: transitions manipulate node playback directly, so
/// each state needs an exclusive root it can rewind without side effects on
/// siblings.
fn dedup_state_roots(
    nodes: &mut Vec<Option<MotionNode>>,
    roots: &mut [Option<NodeIndex>],
) -> bool {
    let mut changed = false;
    let mut claimed = vec![false; nodes.len()];
    for root in roots.iter_mut() {
        let idx = match root {
            Some(idx) => *idx,
            None => continue,
        };
        let c = idx.usize();
        if c >= nodes.len() || nodes[c].is_none() {
            continue;
        }
        if !claimed[c] {
            claimed[c] = true;
        } else {
            let new_index = NodeIndex(nodes.len() as u32);
            nodes.push(nodes[c].clone());
            claimed.push(true);
            *root = Some(new_index);
            changed = true;
        }
    }
    changed
}
