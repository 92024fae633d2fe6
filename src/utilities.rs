/// Swaps rows and columns of a fully materialized matrix.
///
/// # Panics
/// If the rows are not all the same length.
pub fn transpose<T>(matrix: Vec<Vec<T>>) -> Vec<Vec<T>> {
    let Some(width) = matrix.first().map(Vec::len) else {
        return Vec::new();
    };
    let height = matrix.len();

    let mut out: Vec<Vec<T>> = (0..width).map(|_| Vec::with_capacity(height)).collect();
    for (y, row) in matrix.into_iter().enumerate() {
        assert_eq!(
            row.len(),
            width,
            "ragged matrix: row {y} has {} elements, expected {width}",
            row.len()
        );
        for (x, value) in row.into_iter().enumerate() {
            out[x].push(value);
        }
    }
    out
}

/// Escapes a string for use inside a single-quoted SQL literal.
///
/// Quotes are doubled on every call, so escaping an already escaped string doubles them again.
pub fn quote_str(s: &str) -> String {
    s.replace('\'', "''")
}
