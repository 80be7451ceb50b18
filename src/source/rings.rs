//! Assembly of closed rings from way segments.

use geo::{Coord, LineString, Polygon};

/// Attach `segment` to either end of `chain` if an endpoint matches.
///
/// Returns the segment back when it does not touch the chain.
fn join(chain: &mut Vec<Coord<f64>>, mut segment: Vec<Coord<f64>>) -> Option<Vec<Coord<f64>>> {
    let (Some(&head), Some(&tail)) = (chain.first(), chain.last()) else {
        return Some(segment);
    };
    let (Some(&start), Some(&end)) = (segment.first(), segment.last()) else {
        return None;
    };

    if tail == start || tail == end {
        if tail == end {
            segment.reverse();
        }
        chain.extend(segment.into_iter().skip(1));
        None
    } else if head == end || head == start {
        if head == start {
            segment.reverse();
        }
        segment.pop();
        segment.append(chain);
        *chain = segment;
        None
    } else {
        Some(segment)
    }
}

fn is_closed(ring: &[Coord<f64>]) -> bool {
    ring.len() >= 4 && ring.first() == ring.last()
}

/// Merge way segments into closed polygons.
///
/// Segments are chained end to end in any direction. A chain that cannot be
/// extended further is closed if it has at least three distinct points and
/// dropped otherwise.
pub fn assemble_rings(segments: Vec<Vec<Coord<f64>>>) -> Vec<Polygon<f64>> {
    let mut polygons = Vec::new();
    let mut pending = segments;
    pending.reverse();

    while let Some(mut chain) = pending.pop() {
        while !is_closed(&chain) {
            let mut rest = Vec::with_capacity(pending.len());
            let mut extended = false;
            // Keep `pending` in original order so chaining is deterministic
            while let Some(segment) = pending.pop() {
                if extended {
                    rest.push(segment);
                    continue;
                }
                match join(&mut chain, segment) {
                    Some(untouched) => rest.push(untouched),
                    None => extended = true,
                }
            }
            rest.reverse();
            pending = rest;
            if !extended {
                break;
            }
        }

        if chain.len() >= 3 && chain.first() != chain.last() {
            chain.push(chain[0]);
        }
        if is_closed(&chain) {
            polygons.push(Polygon::new(LineString::new(chain), vec![]));
        }
    }

    polygons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_closed_ring() {
        let ring = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0), c(0.0, 0.0)];
        let polygons = assemble_rings(vec![ring]);
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].exterior().0.len(), 5);
    }

    #[test]
    fn test_split_ring() {
        let s1 = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0)];
        let s2 = vec![c(1.0, 1.0), c(0.0, 1.0), c(0.0, 0.0)];
        let polygons = assemble_rings(vec![s1, s2]);
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].exterior().0.len(), 5);
    }

    #[test]
    fn test_reversed_and_disordered_segments() {
        let s1 = vec![c(0.0, 0.0), c(1.0, 0.0)];
        let s2 = vec![c(0.0, 1.0), c(1.0, 1.0), c(1.0, 0.0)];
        let s3 = vec![c(0.0, 0.0), c(0.0, 1.0)];
        let polygons = assemble_rings(vec![s2, s3, s1]);
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].exterior().0.len(), 5);
    }

    #[test]
    fn test_two_separate_rings() {
        let a = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 0.0)];
        let b = vec![c(5.0, 5.0), c(6.0, 5.0), c(6.0, 6.0), c(5.0, 5.0)];
        assert_eq!(assemble_rings(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_disconnected_segments_are_dropped() {
        let s1 = vec![c(0.0, 0.0), c(1.0, 0.0)];
        let s2 = vec![c(1.0, 1.0), c(0.0, 1.0)];
        assert!(assemble_rings(vec![s1, s2]).is_empty());
    }
}
