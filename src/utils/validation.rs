use crate::models::AppError;

pub fn validate_url(url: &str) -> Result<(), AppError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AppError::Config(format!("Invalid URL: {}", url)));
    }

    Ok(())
}

pub fn validate_positive(name: &str, value: u64) -> Result<(), AppError> {
    if value == 0 {
        return Err(AppError::Config(format!("{} must be a positive integer", name)));
    }

    Ok(())
}

/// Parses a comma-separated list of positive plan ids. Blank entries are ignored.
pub fn parse_plan_ids(raw: &str) -> Result<Vec<u32>, AppError> {
    let mut ids = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let id: u32 = token
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid plan id: {:?}", token)))?;
        if id == 0 {
            return Err(AppError::Config("Plan ids must be positive".to_string()));
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}
