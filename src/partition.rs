//! Splitting rendered value rows into statement-sized groups.
//!
//! Both partitioners return contiguous slices of the input, so flattening the
//! groups reproduces the input order exactly. Engines that report generated
//! ids in statement order depend on that.

/// Group rows so that `reserved_bytes + Σ row bytes + separators <= max_bytes`.
///
/// The separator count is approximated by the number of rows already in the
/// group. A row too large to fit on its own still gets a group of its own; it
/// is never dropped or split. Lengths are byte lengths of the UTF-8 text.
pub fn partition_by_bytes<T: AsRef<str>>(
    rows: &[T],
    reserved_bytes: usize,
    max_bytes: usize,
) -> Vec<&[T]> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut running_size = 0;

    for (i, row) in rows.iter().enumerate() {
        let row_bytes = row.as_ref().len();
        let group_len = i - start;
        let bytes_thus_far = reserved_bytes + running_size + row_bytes + group_len;

        if group_len == 0 || bytes_thus_far <= max_bytes {
            running_size += row_bytes;
        } else {
            groups.push(&rows[start..i]);
            start = i;
            running_size = row_bytes;
        }
    }

    if start < rows.len() {
        groups.push(&rows[start..]);
    }

    groups
}

/// Fixed-size chunking; `max_rows == 0` means no limit.
pub fn partition_by_count<T>(rows: &[T], max_rows: usize) -> Vec<&[T]> {
    if rows.is_empty() {
        return Vec::new();
    }
    if max_rows == 0 {
        return vec![rows];
    }
    rows.chunks(max_rows).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seven_byte_rows() -> Vec<String> {
        vec!["('aaa')".to_string(), "('bbb')".to_string(), "('ccc')".to_string()]
    }

    fn shape(groups: &[&[String]]) -> Vec<usize> {
        groups.iter().map(|g| g.len()).collect()
    }

    #[test]
    fn test_bytes_singletons_below_two_row_budget() {
        let rows = seven_byte_rows();
        for max in [33, 40] {
            let groups = partition_by_bytes(&rows, 26, max);
            assert_eq!(shape(&groups), vec![1, 1, 1], "max_bytes={max}");
        }
    }

    #[test]
    fn test_bytes_pairs_between_budgets() {
        let rows = seven_byte_rows();
        for max in [41, 48] {
            let groups = partition_by_bytes(&rows, 26, max);
            assert_eq!(shape(&groups), vec![2, 1], "max_bytes={max}");
            assert_eq!(groups[0], &rows[..2]);
        }
    }

    #[test]
    fn test_bytes_single_group_when_everything_fits() {
        let rows = seven_byte_rows();
        for max in [49, 50, 10_000] {
            let groups = partition_by_bytes(&rows, 26, max);
            assert_eq!(shape(&groups), vec![3], "max_bytes={max}");
        }
    }

    #[test]
    fn test_bytes_oversized_row_is_kept_as_singleton() {
        let rows = vec![
            "(1)".to_string(),
            format!("('{}')", "x".repeat(100)),
            "(2)".to_string(),
        ];
        let groups = partition_by_bytes(&rows, 10, 20);
        assert_eq!(shape(&groups), vec![1, 1, 1]);
        assert!(groups.iter().all(|g| !g.is_empty()));

        let first_too_big = vec![format!("('{}')", "y".repeat(50))];
        assert_eq!(shape(&partition_by_bytes(&first_too_big, 10, 20)), vec![1]);
    }

    #[test]
    fn test_bytes_counts_encoded_bytes_not_chars() {
        let rows = vec!["(ééé)".to_string(), "(ééé)".to_string()];
        assert_eq!(rows[0].len(), 8);
        assert_eq!(shape(&partition_by_bytes(&rows, 0, 16)), vec![1, 1]);
        assert_eq!(shape(&partition_by_bytes(&rows, 0, 17)), vec![2]);
    }

    #[test]
    fn test_bytes_groups_respect_budget_and_order() {
        let rows: Vec<String> = (0..200).map(|i| format!("({},'row {}')", i, i)).collect();
        let reserved = 30;
        let max = 400;
        let groups = partition_by_bytes(&rows, reserved, max);

        for group in &groups {
            let size: usize = group.iter().map(|r| r.len()).sum::<usize>() + group.len() - 1;
            assert!(reserved + size <= max);
        }
        let flattened: Vec<&String> = groups.iter().flat_map(|g| g.iter()).collect();
        assert_eq!(flattened, rows.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_bytes_empty_input() {
        let rows: Vec<String> = Vec::new();
        assert!(partition_by_bytes(&rows, 10, 100).is_empty());
    }

    #[test]
    fn test_count_chunks_evenly() {
        let rows: Vec<u32> = (0..2500).collect();
        let groups = partition_by_count(&rows, 500);
        assert_eq!(groups.len(), 5);
        assert!(groups.iter().all(|g| g.len() == 500));
    }

    #[test]
    fn test_count_short_tail_and_unbounded() {
        let rows: Vec<u32> = (0..7).collect();
        assert_eq!(
            partition_by_count(&rows, 3).iter().map(|g| g.len()).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );
        assert_eq!(partition_by_count(&rows, 0).len(), 1);
        assert!(partition_by_count::<u32>(&[], 3).is_empty());
    }
}
