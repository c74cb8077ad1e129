use thiserror::Error;

/// How to treat tokens that are non-numeric or outside the displayed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SelectionPolicy {
    /// Skip invalid tokens and keep the rest of the selection.
    #[default]
    DropInvalid,
    /// Abort the whole selection if any token is invalid.
    Strict,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("invalid selection token '{0}': expected a number between 1 and {1}")]
    InvalidToken(String, usize),
}

/// Parse a selection expression against a list of `len` displayed records.
///
/// Accepted forms: the literal `all`, or a comma-separated list of 1-based
/// indices (`1,3,5`). Returns 0-based indices with duplicates removed,
/// first occurrence order preserved. Empty input is an empty selection,
/// not an error.
pub fn parse_selection(
    input: &str,
    len: usize,
    policy: SelectionPolicy,
) -> Result<Vec<usize>, SelectionError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Vec::new());
    }
    if input.eq_ignore_ascii_case("all") {
        return Ok((0..len).collect());
    }

    let mut indices = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        match token.parse::<usize>() {
            Ok(n) if (1..=len).contains(&n) => {
                let idx = n - 1;
                if !indices.contains(&idx) {
                    indices.push(idx);
                }
            }
            _ => match policy {
                SelectionPolicy::DropInvalid => {
                    tracing::debug!("dropping invalid selection token '{}'", token);
                }
                SelectionPolicy::Strict => {
                    return Err(SelectionError::InvalidToken(token.to_string(), len));
                }
            },
        }
    }

    Ok(indices)
}
