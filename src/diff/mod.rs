//! Content consistency diff
//!
//! Detects content divergence across vantage points (CDN routing, geo
//! blocking) by comparing the content digests workers reported for the same
//! URI. Pure function over the digest map; O(n²) in worker count, which is
//! fine for fleets of tens.

use std::collections::BTreeMap;

/// Build the pairwise consistency matrix from per-worker digests
///
/// Input is the representative digest per worker, restricted to workers with
/// at least one successful fetch. The result holds an entry for every ordered
/// pair, so `matrix[a][b] == matrix[b][a]` and `matrix[a][a]` is trivially
/// true. Clients index it by whichever worker they care about.
pub fn consistency_matrix(
    digests: &BTreeMap<String, String>,
) -> BTreeMap<String, BTreeMap<String, bool>> {
    let mut matrix = BTreeMap::new();

    for (worker_a, digest_a) in digests {
        let mut row = BTreeMap::new();
        for (worker_b, digest_b) in digests {
            row.insert(worker_b.clone(), digest_a == digest_b);
        }
        matrix.insert(worker_a.clone(), row);
    }

    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digests(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(w, d)| (w.to_string(), d.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(consistency_matrix(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_all_matching() {
        let matrix = consistency_matrix(&digests(&[
            ("a:1", "aaaa"),
            ("b:1", "aaaa"),
            ("c:1", "aaaa"),
        ]));

        for row in matrix.values() {
            for &consistent in row.values() {
                assert!(consistent);
            }
        }
    }

    #[test]
    fn test_divergent_worker() {
        let matrix = consistency_matrix(&digests(&[
            ("a:1", "aaaa"),
            ("b:1", "bbbb"),
            ("c:1", "aaaa"),
        ]));

        assert!(matrix["a:1"]["c:1"]);
        assert!(!matrix["a:1"]["b:1"]);
        assert!(!matrix["b:1"]["c:1"]);
    }

    #[test]
    fn test_symmetry_and_diagonal() {
        let input = digests(&[("a:1", "x"), ("b:1", "y"), ("c:1", "x"), ("d:1", "z")]);
        let matrix = consistency_matrix(&input);

        for worker_a in input.keys() {
            assert!(matrix[worker_a][worker_a], "diagonal must be true");
            for worker_b in input.keys() {
                assert_eq!(matrix[worker_a][worker_b], matrix[worker_b][worker_a]);
            }
        }
    }

    #[test]
    fn test_matrix_covers_exactly_input_workers() {
        let input = digests(&[("a:1", "x"), ("b:1", "y")]);
        let matrix = consistency_matrix(&input);

        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix["a:1"].len(), 2);
        assert_eq!(matrix["b:1"].len(), 2);
    }
}
