//! Pure, side-effect-free traversal over the recorded graph.
//!
//! Some recorded nodes are library plumbing, flagged internal. User-facing
//! views want them gone but their *connectivity* kept: eliding a node means
//! replacing it with its own neighbors in the traversal direction, repeated
//! until only non-internal nodes remain. The graph may contain cycles (a
//! subject subscribed to itself is legitimate), so every walk carries a
//! visited set; a node revisited during one pass is dropped, not re-expanded.

use skein_recorder::{Destination, EventRef, Recorder, TargetRef};
use std::collections::{HashSet, VecDeque};

/// Which way to walk the instance/subscription graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward what a target is derived from / subscribed to.
    Sources,
    /// Toward what a target feeds.
    Destinations,
}

fn direct_neighbors(recorder: &Recorder, target: TargetRef, direction: Direction) -> Vec<TargetRef> {
    match (target, direction) {
        (TargetRef::Instance(instance), Direction::Sources) => recorder
            .instance_source(instance)
            .map(TargetRef::Instance)
            .into_iter()
            .collect(),
        (TargetRef::Instance(instance), Direction::Destinations) => recorder
            .instance_subscriptions(instance)
            .into_iter()
            .map(TargetRef::Subscription)
            .collect(),
        (TargetRef::Subscription(subscription), Direction::Sources) => {
            vec![TargetRef::Instance(
                recorder.subscription_instance(subscription),
            )]
        }
        (TargetRef::Subscription(subscription), Direction::Destinations) => recorder
            .subscription_destination(subscription)
            .as_ref()
            .and_then(Destination::target)
            .into_iter()
            .collect(),
    }
}

/// Replaces every internal target in `targets` with its own (recursively
/// elided) neighbors in `direction`. Non-internal targets pass through.
/// Idempotent: the output contains no internal targets, so a second pass
/// returns it unchanged.
pub fn elide_internal(
    recorder: &Recorder,
    targets: Vec<TargetRef>,
    direction: Direction,
) -> Vec<TargetRef> {
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    for target in targets {
        if !visited.insert(target) {
            continue;
        }
        if recorder.is_internal(target) {
            expand(recorder, target, direction, &mut visited, &mut out);
        } else {
            out.push(target);
        }
    }
    out
}

/// The first layer of non-internal neighbors of `target` in `direction`.
pub fn visible_neighbors(
    recorder: &Recorder,
    target: TargetRef,
    direction: Direction,
) -> Vec<TargetRef> {
    let mut visited = HashSet::new();
    visited.insert(target);
    let mut out = Vec::new();
    expand(recorder, target, direction, &mut visited, &mut out);
    out
}

fn expand(
    recorder: &Recorder,
    target: TargetRef,
    direction: Direction,
    visited: &mut HashSet<TargetRef>,
    out: &mut Vec<TargetRef>,
) {
    for neighbor in direct_neighbors(recorder, target, direction) {
        if !visited.insert(neighbor) {
            continue;
        }
        if recorder.is_internal(neighbor) {
            expand(recorder, neighbor, direction, visited, out);
        } else {
            out.push(neighbor);
        }
    }
}

/// The closest preceding event whose target is not internal, walking the
/// causal chain backward past elided events.
pub fn preceding_event(recorder: &Recorder, event: EventRef) -> Option<EventRef> {
    let mut cursor = recorder.event_preceding(event);
    while let Some(candidate) = cursor {
        if !recorder.is_internal(recorder.event_target(candidate)) {
            return Some(candidate);
        }
        cursor = recorder.event_preceding(candidate);
    }
    None
}

/// The succeeding events with non-internal targets, expanding through elided
/// events' own children.
pub fn succeeding_events(recorder: &Recorder, event: EventRef) -> Vec<EventRef> {
    let mut visited = HashSet::new();
    visited.insert(event);
    let mut out = Vec::new();
    collect_succeeding(recorder, event, &mut visited, &mut out);
    out
}

fn collect_succeeding(
    recorder: &Recorder,
    event: EventRef,
    visited: &mut HashSet<EventRef>,
    out: &mut Vec<EventRef>,
) {
    for child in recorder.event_succeeding(event) {
        if !visited.insert(child) {
            continue;
        }
        if recorder.is_internal(recorder.event_target(child)) {
            collect_succeeding(recorder, child, visited, out);
        } else {
            out.push(child);
        }
    }
}

/// Every non-internal target reachable from `start` over elided
/// source/destination edges plus elided causal event chains, deduplicated,
/// in breadth-first discovery order. This is what seeds a visualizer's view.
pub fn related_targets(recorder: &Recorder, start: TargetRef) -> Vec<TargetRef> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut queue = VecDeque::new();

    for root in elide_internal(recorder, vec![start], Direction::Sources) {
        if seen.insert(root) {
            out.push(root);
            queue.push_back(root);
        }
    }

    while let Some(target) = queue.pop_front() {
        let mut discovered = Vec::new();
        discovered.extend(visible_neighbors(recorder, target, Direction::Sources));
        discovered.extend(visible_neighbors(recorder, target, Direction::Destinations));
        for event in recorder.target_events(target) {
            if let Some(parent) = preceding_event(recorder, event) {
                discovered.push(recorder.event_target(parent));
            }
            for child in succeeding_events(recorder, event) {
                discovered.push(recorder.event_target(child));
            }
        }
        for found in discovered {
            if seen.insert(found) {
                out.push(found);
                queue.push_back(found);
            }
        }
    }
    out
}
