use std::cmp::Ordering;
use std::fmt::Debug;

/// Structure to store search results
/// Entries are (document index, cosine score).
#[derive(Clone, Default, PartialEq)]
pub struct Hits {
    pub list: Vec<(u32, f32)>,
}

impl Hits {
    /// Create a new Hits instance
    pub fn new(vec: Vec<(u32, f32)>) -> Self {
        Hits { list: vec }
    }

    /// Sort results by descending score
    /// Stable: equal scores (0.0 and -0.0 included) keep their current order.
    /// NaN scores are kept and go last.
    pub fn sort_by_score(&mut self) -> &mut Self {
        self.list.sort_by(|a, b| match (a.1.is_nan(), b.1.is_nan()) {
            (false, false) => b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal),
            (x, y) => x.cmp(&y),
        });
        self
    }

    /// Keep at most `top_k` entries
    pub fn truncate(&mut self, top_k: usize) -> &mut Self {
        self.list.truncate(top_k);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &(u32, f32)> {
        self.list.iter()
    }

    /// Score of a document index, None if absent
    pub fn score_of(&self, doc: u32) -> Option<f32> {
        self.list.iter().find(|(d, _)| *d == doc).map(|(_, s)| *s)
    }
}

impl IntoIterator for Hits {
    type Item = (u32, f32);
    type IntoIter = std::vec::IntoIter<(u32, f32)>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.into_iter()
    }
}

impl Debug for Hits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            // Pretty print with alternate formatting: each hit on a new line
            writeln!(f, "Hits [")?;
            for (doc, score) in &self.list {
                writeln!(f, "    {}: {:.6}", doc, score)?;
            }
            write!(f, "]")
        } else {
            f.debug_list().entries(&self.list).finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_is_descending_and_stable() {
        let mut hits = Hits::new(vec![(0, 0.5), (1, 0.9), (2, 0.5), (3, -0.2), (4, 0.9)]);
        hits.sort_by_score();
        let order: Vec<u32> = hits.iter().map(|(d, _)| *d).collect();
        assert_eq!(order, vec![1, 4, 0, 2, 3]);
    }

    #[test]
    fn nan_scores_are_kept_last() {
        let mut hits = Hits::new(vec![(0, f32::NAN), (1, 0.1), (2, 0.7)]);
        hits.sort_by_score();
        let order: Vec<u32> = hits.iter().map(|(d, _)| *d).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn signed_zeros_tie() {
        let mut hits = Hits::new(vec![(0, -0.0), (1, 0.0), (2, -0.0)]);
        hits.sort_by_score();
        let order: Vec<u32> = hits.iter().map(|(d, _)| *d).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn truncate_keeps_exactly_top_k() {
        let mut hits = Hits::new((0..30).map(|i| (i, 1.0 - i as f32 / 100.0)).collect());
        hits.sort_by_score().truncate(20);
        assert_eq!(hits.len(), 20);
        assert_eq!(hits.list.last().map(|h| h.0), Some(19));

        let mut few = Hits::new(vec![(0, 1.0)]);
        few.truncate(20);
        assert_eq!(few.len(), 1);
    }

    #[test]
    fn pretty_debug_lists_each_hit() {
        let hits = Hits::new(vec![(3, 0.25)]);
        assert_eq!(format!("{:#?}", hits), "Hits [\n    3: 0.250000\n]");
    }
}
