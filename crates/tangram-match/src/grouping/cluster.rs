use crate::grouping::GroupId;
use crate::piece::PieceId;

/// Per-piece input to clustering.
#[derive(Debug, Clone)]
pub(crate) struct ClusterNode {
    pub(crate) id: PieceId,
    pub(crate) position: [f64; 2],
    /// Largest extent of the piece in observation units.
    pub(crate) width: f64,
    pub(crate) feature: f64,
    pub(crate) recent: bool,
    pub(crate) prev_group: Option<GroupId>,
}

/// A proximity link between two nodes (indices into the node slice).
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClusterEdge {
    pub(crate) a: usize,
    pub(crate) b: usize,
    pub(crate) distance: f64,
    pub(crate) threshold: f64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Clustering {
    /// Node indices per component, each sorted; components ordered by their
    /// smallest piece id.
    pub(crate) components: Vec<Vec<usize>>,
    pub(crate) edges: Vec<ClusterEdge>,
}

fn find(parent: &mut [usize], i: usize) -> usize {
    if parent[i] != i {
        parent[i] = find(parent, parent[i]);
    }
    parent[i]
}

fn union(parent: &mut [usize], rank: &mut [usize], i: usize, j: usize) {
    let pi = find(parent, i);
    let pj = find(parent, j);
    if pi != pj {
        if rank[pi] < rank[pj] {
            parent[pi] = pj;
        } else if rank[pi] > rank[pj] {
            parent[pj] = pi;
        } else {
            parent[pj] = pi;
            rank[pi] += 1;
        }
    }
}

/// Link proximate pieces and return connected components.
///
/// Two pieces link when their centers are closer than
/// `proximity_piece_widths` times their mean width and either was moved
/// recently or they already shared a group last frame.
pub(crate) fn cluster_pieces(nodes: &[ClusterNode], proximity_piece_widths: f64) -> Clustering {
    let n = nodes.len();
    let mut parent: Vec<usize> = (0..n).collect();
    let mut rank: Vec<usize> = vec![0; n];
    let mut edges = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (&nodes[i], &nodes[j]);
            let dx = a.position[0] - b.position[0];
            let dy = a.position[1] - b.position[1];
            let distance = (dx * dx + dy * dy).sqrt();
            let threshold = proximity_piece_widths * 0.5 * (a.width + b.width);
            if distance >= threshold {
                continue;
            }
            let sticky = a.prev_group.is_some() && a.prev_group == b.prev_group;
            if !(a.recent || b.recent || sticky) {
                continue;
            }
            union(&mut parent, &mut rank, i, j);
            edges.push(ClusterEdge {
                a: i,
                b: j,
                distance,
                threshold,
            });
        }
    }

    let mut by_root: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
    for i in 0..n {
        let root = find(&mut parent, i);
        by_root.entry(root).or_default().push(i);
    }

    let mut components: Vec<Vec<usize>> = by_root.into_values().collect();
    for c in &mut components {
        c.sort_by_key(|&i| nodes[i].id);
    }
    components.sort_by_key(|c| c.first().map(|&i| nodes[i].id));

    Clustering { components, edges }
}
