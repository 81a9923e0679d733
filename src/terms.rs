use crate::error::CurtainError;

pub fn normalize_terms(raw: &str) -> Result<Vec<String>, CurtainError> {
    let fragments = raw.lines().flat_map(|line| line.split(';'));
    let terms = crate::domain::dedup_preserving_order(
        fragments
            .map(str::trim)
            .filter(|fragment| !fragment.is_empty())
            .map(str::to_string),
    );
    if terms.is_empty() {
        return Err(CurtainError::EmptyInput);
    }
    Ok(terms)
}
