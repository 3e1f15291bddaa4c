//! Output formatting helpers

/// Render rows as a borderless, left aligned table.
///
/// The header row is followed by a dashed separator. Columns are padded to
/// the widest cell; rows shorter than the header are padded with blanks.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let columns = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    for row in rows {
        for (i, cell) in row.iter().take(columns).enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header_cells: Vec<String> = headers.iter().map(|h| h.to_uppercase()).collect();
    push_row(&mut out, &header_cells, &widths);

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &separator, &widths);

    for row in rows {
        push_row(&mut out, row, &widths);
    }

    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let mut line = String::new();
    for (i, width) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        if i > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        let pad = width.saturating_sub(cell.chars().count());
        line.push_str(&" ".repeat(pad));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

const MASK: &str = "************";

/// Mask every occurrence of `secret` in `line`
pub fn mask(line: &str, secret: &str) -> String {
    if secret.is_empty() {
        return line.to_string();
    }
    line.replace(secret, MASK)
}

/// Mask every occurrence of all `secrets` in `line`.
///
/// Longer secrets are masked first so a secret containing another one is
/// never left partly visible.
pub fn mask_all<'a>(line: &str, secrets: impl IntoIterator<Item = &'a str>) -> String {
    let mut secrets: Vec<&str> = secrets.into_iter().filter(|s| !s.is_empty()).collect();
    secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
    secrets
        .into_iter()
        .fold(line.to_string(), |masked, secret| mask(&masked, secret))
}
