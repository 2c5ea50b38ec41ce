use std::collections::BTreeSet;

use super::{ConstructionGroup, GroupId};
use crate::piece::PieceId;

/// Carry group identity, anchor and mapping from last frame's groups onto
/// this frame's components.
///
/// A component inherits the previous group whose anchor it contains; when it
/// contains several anchors (a merge) the most confident group wins. A
/// component without any previous anchor inherits the id of the previous
/// group it overlaps most, with anchor and mapping cleared. Everything else
/// gets a fresh id. Each previous id is handed out at most once.
pub(crate) fn migrate_groups(
    components: &[Vec<PieceId>],
    previous: &[ConstructionGroup],
    next_id: &mut u32,
) -> Vec<ConstructionGroup> {
    let mut claimed: BTreeSet<GroupId> = BTreeSet::new();
    let mut inherited: Vec<Option<&ConstructionGroup>> = vec![None; components.len()];

    for (ci, members) in components.iter().enumerate() {
        let best = previous
            .iter()
            .filter(|g| g.anchor.is_some_and(|a| members.binary_search(&a).is_ok()))
            .max_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then_with(|| b.id.cmp(&a.id))
            });
        if let Some(g) = best {
            let n_anchored = previous
                .iter()
                .filter(|p| p.anchor.is_some_and(|a| members.binary_search(&a).is_ok()))
                .count();
            if n_anchored > 1 {
                tracing::debug!(group = g.id.0, n_anchored, "groups merged, keeping the most confident anchor");
            }
            claimed.insert(g.id);
            inherited[ci] = Some(g);
        }
    }

    let mut out = Vec::with_capacity(components.len());
    for (ci, members) in components.iter().enumerate() {
        let group = match inherited[ci] {
            Some(prev) => ConstructionGroup {
                members: members.clone(),
                ..prev.clone()
            },
            None => {
                let overlap = previous
                    .iter()
                    .filter(|g| !claimed.contains(&g.id))
                    .map(|g| {
                        let n = g
                            .members
                            .iter()
                            .filter(|m| members.binary_search(m).is_ok())
                            .count();
                        (n, g)
                    })
                    .filter(|(n, _)| *n > 0)
                    .max_by(|(na, a), (nb, b)| na.cmp(nb).then_with(|| b.id.cmp(&a.id)));
                let id = match overlap {
                    Some((_, g)) => {
                        if g.mapping.is_some() {
                            tracing::debug!(group = g.id.0, "group split off its anchor, mapping cleared");
                        }
                        g.id
                    }
                    None => {
                        let id = GroupId(*next_id);
                        *next_id += 1;
                        id
                    }
                };
                claimed.insert(id);
                ConstructionGroup::new(id, members.clone())
            }
        };
        out.push(group);
    }
    out
}
