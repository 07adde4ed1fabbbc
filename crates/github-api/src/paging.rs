//! Page-size ladder used when the upstream gateway gives up on a request.
//!
//! Large notification pages occasionally time out at GitHub's edge with a 502
//! or 504. Asking for the same items in smaller pages usually succeeds, so the
//! fetch loop walks down a fixed ladder of sizes and never climbs back up for
//! the rest of that fetch.

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Descending page sizes tried after a gateway error.
pub const PAGE_SIZE_LADDER: [usize; 4] = [50, 25, 10, 5];

/// Smallest page size the ladder will ever request.
pub const MIN_PAGE_SIZE: usize = 5;

/// Where the next request should land.
///
/// `skip` is the number of leading rows on that page that were already
/// collected at a previous, larger page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStep {
    pub per_page: usize,
    pub page: usize,
    pub skip: usize,
}

impl PageStep {
    /// The 1-based page containing item `offset` at `per_page` items per page.
    pub fn at_offset(per_page: usize, offset: usize) -> Self {
        let per_page = per_page.max(1);
        Self {
            per_page,
            page: offset / per_page + 1,
            skip: offset % per_page,
        }
    }
}

/// Next step after a gateway error at `current` page size, with
/// `items_fetched` items already collected.
///
/// Returns `None` once the floor is reached.
pub fn degrade_page_size(current: usize, items_fetched: usize) -> Option<PageStep> {
    PAGE_SIZE_LADDER
        .iter()
        .copied()
        .find(|&size| size < current && size >= MIN_PAGE_SIZE)
        .map(|size| PageStep::at_offset(size, items_fetched))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page() {
        assert_eq!(
            PageStep::at_offset(50, 0),
            PageStep {
                per_page: 50,
                page: 1,
                skip: 0
            }
        );
    }

    #[test]
    fn test_degrade_resumes_at_same_offset() {
        // Page 2 at 50 failed, 50 items already collected.
        let step = degrade_page_size(50, 50).unwrap();
        assert_eq!(step.per_page, 25);
        assert_eq!(step.page, 3);
        assert_eq!(step.skip, 0);
        assert_eq!((step.page - 1) * step.per_page + step.skip, 50);
    }

    #[test]
    fn test_degrade_with_unaligned_offset() {
        // 75 items fetched at 25, then 10: page 8 starts at item 70.
        let step = degrade_page_size(25, 75).unwrap();
        assert_eq!(step.per_page, 10);
        assert_eq!(step.page, 8);
        assert_eq!(step.skip, 5);
    }

    #[test]
    fn test_degrade_is_strictly_decreasing() {
        let mut size = 50;
        let mut seen = vec![size];
        while let Some(step) = degrade_page_size(size, 0) {
            assert!(step.per_page < size);
            size = step.per_page;
            seen.push(size);
        }
        assert_eq!(seen, vec![50, 25, 10, 5]);
    }

    #[test]
    fn test_floor_stops_degrading() {
        assert_eq!(degrade_page_size(MIN_PAGE_SIZE, 10), None);
        assert_eq!(degrade_page_size(3, 0), None);
    }

    #[test]
    fn test_non_ladder_size_steps_to_next_smaller_rung() {
        assert_eq!(degrade_page_size(100, 0).unwrap().per_page, 50);
        assert_eq!(degrade_page_size(30, 0).unwrap().per_page, 25);
        assert_eq!(degrade_page_size(7, 0).unwrap().per_page, 5);
    }
}
