//! Grouping of overlapping candidates into one rectangle per detection.
//!
//! Candidates are partitioned with union-find under [`similar`], each class is
//! averaged into a representative rectangle whose weight is the class size,
//! classes with too little support are dropped, and small classes sitting
//! inside a better-supported one are suppressed.

use crate::{reserve, DetectError, WeightedRect};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Whether two rectangles describe the same object within tolerance `eps`.
///
/// All four edges must move by at most
/// `eps * (min(w1, w2) + min(h1, h2)) / 2`.
#[inline]
pub fn similar(a: &WeightedRect, b: &WeightedRect, eps: f32) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f32 * 0.5;
    ((a.x - b.x).abs() as f32) <= delta
        && ((a.y - b.y).abs() as f32) <= delta
        && ((a.right() - b.right()).abs() as f32) <= delta
        && ((a.bottom() - b.bottom()).abs() as f32) <= delta
}

/// Union-find forest with union by rank and path compression.
#[derive(Clone, Debug)]
pub struct DisjointSet {
    parent: Vec<Option<usize>>,
    rank: Vec<u32>,
    class: Vec<Option<usize>>,
}

impl DisjointSet {
    /// `n` singleton trees.
    pub fn new(n: usize) -> Result<Self, DetectError> {
        let mut parent = Vec::new();
        let mut rank = Vec::new();
        let mut class = Vec::new();
        reserve(&mut parent, n)?;
        reserve(&mut rank, n)?;
        reserve(&mut class, n)?;
        parent.resize(n, None);
        rank.resize(n, 0);
        class.resize(n, None);
        Ok(Self {
            parent,
            rank,
            class,
        })
    }

    /// Root of `node`'s tree, without modifying the forest.
    #[inline]
    pub fn root(&self, mut node: usize) -> usize {
        while let Some(p) = self.parent[node] {
            node = p;
        }
        node
    }

    /// Point every node on the path from `node` directly at `root`.
    fn compress(&mut self, mut node: usize, root: usize) {
        while let Some(p) = self.parent[node] {
            self.parent[node] = Some(root);
            node = p;
        }
    }

    /// Merge the trees of `a` and `b`, returning the new root.
    ///
    /// The higher-ranked root wins; on a tie `b`'s root wins and its rank
    /// grows. Both paths are compressed onto the surviving root.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let ra = self.root(a);
        let rb = self.root(b);
        if ra == rb {
            return ra;
        }
        let root = if self.rank[ra] > self.rank[rb] {
            self.parent[rb] = Some(ra);
            ra
        } else {
            self.parent[ra] = Some(rb);
            if self.rank[ra] == self.rank[rb] {
                self.rank[rb] += 1;
            }
            rb
        };
        self.compress(b, root);
        self.compress(a, root);
        root
    }

    /// Class id of `node`'s tree; ids are handed out in order of first query.
    fn class_of(&mut self, node: usize, next: &mut usize) -> usize {
        let root = self.root(node);
        *self.class[root].get_or_insert_with(|| {
            let id = *next;
            *next += 1;
            id
        })
    }
}

/// Class label per input plus the number of classes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    pub labels: Vec<usize>,
    pub classes: usize,
}

/// Partition `rects` into equivalence classes of the [`similar`] relation.
///
/// Labels are numbered by the first input index of each class, so the result
/// does not depend on how the forest happened to be shaped.
pub fn partition(rects: &[WeightedRect], eps: f32) -> Result<Partition, DetectError> {
    let n = rects.len();
    let mut set = DisjointSet::new(n)?;

    for i in 0..n {
        for j in 0..n {
            if i == j || !similar(&rects[i], &rects[j], eps) {
                continue;
            }
            set.union(i, j);
        }
    }

    let mut labels = Vec::new();
    reserve(&mut labels, n)?;
    let mut classes = 0;
    for i in 0..n {
        labels.push(set.class_of(i, &mut classes));
    }
    Ok(Partition { labels, classes })
}

#[derive(Clone, Copy, Default)]
struct ClassSum {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    count: u32,
}

#[inline]
fn average(total: i64, scale: f32) -> i32 {
    (total as f32 * scale).round_ties_even() as i32
}

/// Group raw candidates into averaged detections.
///
/// A class survives when its support is strictly greater than
/// `group_threshold`. A surviving class `i` is then dropped if it lies inside
/// another surviving class `j` grown by `eps` of `j`'s size on every side and
/// `j` has support above `max(3, support_i)`, or `support_i < 3`.
///
/// Output rectangles are rounded member averages and are not clipped; a group
/// hugging the image border may extend one pixel past it.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(rects), fields(candidates = rects.len()))
)]
pub fn group_rectangles(
    rects: &[WeightedRect],
    group_threshold: u32,
    eps: f32,
) -> Result<Vec<WeightedRect>, DetectError> {
    let Partition { labels, classes } = partition(rects, eps)?;

    let mut sums = Vec::new();
    reserve(&mut sums, classes)?;
    sums.resize(classes, ClassSum::default());
    for (r, &cls) in rects.iter().zip(&labels) {
        let s = &mut sums[cls];
        s.x += r.x as i64;
        s.y += r.y as i64;
        s.width += r.width as i64;
        s.height += r.height as i64;
        s.count += 1;
    }

    let mut groups = Vec::new();
    reserve(&mut groups, classes)?;
    for s in &sums {
        let inv = 1.0f32 / s.count as f32;
        groups.push(WeightedRect {
            x: average(s.x, inv),
            y: average(s.y, inv),
            width: average(s.width, inv),
            height: average(s.height, inv),
            weight: s.count,
        });
    }

    let mut out = Vec::new();
    for (i, r1) in groups.iter().enumerate() {
        let n1 = r1.weight;
        if n1 <= group_threshold {
            continue;
        }

        let swallowed = groups.iter().enumerate().any(|(j, r2)| {
            let n2 = r2.weight;
            if j == i || n2 <= group_threshold {
                return false;
            }
            let dx = (r2.width as f32 * eps).round_ties_even() as i32;
            let dy = (r2.height as f32 * eps).round_ties_even() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });

        if !swallowed {
            reserve(&mut out, 1)?;
            out.push(*r1);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_GROUP_EPS;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> WeightedRect {
        WeightedRect::new(x, y, w, h)
    }

    #[test]
    fn similarity_uses_smaller_extents() {
        let a = rect(0, 0, 40, 40);
        // delta = 0.2 * (40 + 40) / 2 = 8
        assert!(similar(&a, &rect(8, 8, 40, 40), DEFAULT_GROUP_EPS));
        assert!(!similar(&a, &rect(9, 0, 40, 40), DEFAULT_GROUP_EPS));
        assert!(similar(&a, &a, 0.0));
        // far edge moves by 9 > 8
        assert!(!similar(&a, &rect(0, 0, 49, 40), DEFAULT_GROUP_EPS));
    }

    #[test]
    fn union_by_rank_compresses_paths() {
        let mut set = DisjointSet::new(4).expect("set");
        let r = set.union(0, 1);
        assert_eq!(r, 1);
        let r = set.union(2, 1);
        assert_eq!(r, 1);
        let r = set.union(3, 2);
        assert_eq!(r, 1);
        for i in 0..4 {
            assert_eq!(set.root(i), 1);
        }
        assert_eq!(set.parent[3], Some(1));
    }

    #[test]
    fn partition_is_transitive_in_any_order() {
        // a ~ b and b ~ c, but a is not similar to c
        let a = rect(0, 0, 40, 40);
        let b = rect(6, 0, 40, 40);
        let c = rect(12, 0, 40, 40);
        assert!(similar(&a, &b, DEFAULT_GROUP_EPS));
        assert!(similar(&b, &c, DEFAULT_GROUP_EPS));
        assert!(!similar(&a, &c, DEFAULT_GROUP_EPS));

        let orders = [[a, b, c], [a, c, b], [b, a, c], [b, c, a], [c, a, b], [c, b, a]];
        for order in orders {
            let p = partition(&order, DEFAULT_GROUP_EPS).expect("partition");
            assert_eq!(p.classes, 1);
            assert_eq!(p.labels, vec![0, 0, 0]);
        }
    }

    #[test]
    fn distant_rectangles_stay_apart() {
        let a = rect(0, 0, 40, 40);
        let b = rect(30, 30, 40, 40);
        let p = partition(&[a, b], DEFAULT_GROUP_EPS).expect("partition");
        assert_eq!(p.classes, 2);
        assert_eq!(p.labels, vec![0, 1]);
    }

    #[test]
    fn labels_follow_first_appearance() {
        let a = rect(100, 100, 20, 20);
        let b = rect(0, 0, 20, 20);
        let rects = [a, b, a, b, b];
        let p = partition(&rects, DEFAULT_GROUP_EPS).expect("partition");
        assert_eq!(p.labels, vec![0, 1, 0, 1, 1]);
    }

    #[test]
    fn repeated_candidate_collapses_with_full_support() {
        let r = rect(17, 23, 44, 44);
        let grouped = group_rectangles(&[r; 5], 3, DEFAULT_GROUP_EPS).expect("group");
        assert_eq!(grouped, vec![WeightedRect { weight: 5, ..r }]);
    }

    #[test]
    fn support_equal_to_threshold_is_dropped() {
        let r = rect(10, 10, 30, 30);
        assert!(group_rectangles(&[r; 3], 3, DEFAULT_GROUP_EPS)
            .expect("group")
            .is_empty());
        assert_eq!(group_rectangles(&[r; 4], 3, DEFAULT_GROUP_EPS).expect("group").len(), 1);
    }

    #[test]
    fn members_are_averaged_with_rounding() {
        let rects = [rect(10, 10, 40, 40), rect(11, 12, 41, 40), rect(12, 10, 40, 43)];
        let grouped = group_rectangles(&rects, 1, DEFAULT_GROUP_EPS).expect("group");
        // x 33/3 = 11, y 32/3 = 10.67, w 121/3 = 40.33, h 123/3 = 41
        assert_eq!(grouped, vec![WeightedRect {
            x: 11,
            y: 11,
            width: 40,
            height: 41,
            weight: 3
        }]);
    }

    #[test]
    fn weak_nested_group_is_suppressed() {
        let big = rect(100, 100, 80, 80);
        let small = rect(120, 120, 30, 30);
        let mut rects = vec![big; 6];
        rects.extend([small; 2]);

        let grouped = group_rectangles(&rects, 1, DEFAULT_GROUP_EPS).expect("group");
        assert_eq!(grouped, vec![WeightedRect { weight: 6, ..big }]);
    }

    #[test]
    fn nested_group_with_more_support_survives() {
        let big = rect(100, 100, 80, 80);
        let small = rect(120, 120, 30, 30);
        let mut rects = vec![big; 4];
        rects.extend([small; 5]);

        let grouped = group_rectangles(&rects, 1, DEFAULT_GROUP_EPS).expect("group");
        assert_eq!(grouped.len(), 2);
        assert!(grouped.contains(&WeightedRect { weight: 5, ..small }));
        assert!(grouped.contains(&WeightedRect { weight: 4, ..big }));
    }

    #[test]
    fn tied_support_keeps_both_groups() {
        let big = rect(100, 100, 80, 80);
        let small = rect(120, 120, 30, 30);
        let mut rects = vec![big; 4];
        rects.extend([small; 4]);

        let grouped = group_rectangles(&rects, 1, DEFAULT_GROUP_EPS).expect("group");
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn nested_group_below_three_is_suppressed_by_equal_support() {
        let big = rect(100, 100, 80, 80);
        let small = rect(120, 120, 30, 30);
        let rects = [big, big, small, small];

        // 2 > max(3, 2) fails, so only support < 3 drops the inner group
        let grouped = group_rectangles(&rects, 1, DEFAULT_GROUP_EPS).expect("group");
        assert_eq!(grouped, vec![WeightedRect { weight: 2, ..big }]);
    }

    #[test]
    fn containment_margin_is_inclusive() {
        let big = rect(100, 100, 80, 80);
        let grouped_with = |inner_x: i32| {
            let inner = rect(inner_x, 120, 30, 30);
            let mut rects = vec![big; 6];
            rects.extend([inner; 2]);
            group_rectangles(&rects, 1, DEFAULT_GROUP_EPS).expect("group")
        };

        // dx = round(80 * 0.2) = 16, so the grown box starts at x = 84
        assert_eq!(grouped_with(84), vec![WeightedRect { weight: 6, ..big }]);

        let kept = grouped_with(83);
        assert_eq!(kept.len(), 2);
        assert!(kept.contains(&WeightedRect {
            weight: 2,
            ..rect(83, 120, 30, 30)
        }));
    }

    #[test]
    fn regrouping_separated_output_is_stable() {
        let rects = [
            rect(0, 0, 30, 30),
            rect(1, 0, 30, 30),
            rect(0, 1, 30, 30),
            rect(200, 40, 60, 60),
            rect(202, 42, 60, 60),
            rect(90, 150, 24, 24),
        ];
        let first = group_rectangles(&rects, 0, DEFAULT_GROUP_EPS).expect("group");
        assert_eq!(first.len(), 3);

        let singles: Vec<WeightedRect> = first
            .iter()
            .map(|r| WeightedRect { weight: 0, ..*r })
            .collect();
        let second = group_rectangles(&singles, 0, DEFAULT_GROUP_EPS).expect("group");
        let geometry = |v: &[WeightedRect]| -> Vec<(i32, i32, i32, i32)> {
            v.iter().map(|r| (r.x, r.y, r.width, r.height)).collect()
        };
        assert_eq!(geometry(&second), geometry(&first));
        assert!(second.iter().all(|r| r.weight == 1));
    }

    #[test]
    fn empty_input_groups_to_nothing() {
        assert!(group_rectangles(&[], 1, DEFAULT_GROUP_EPS)
            .expect("group")
            .is_empty());
    }
}
