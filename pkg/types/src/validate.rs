use anyhow::{Result, bail};

/// Validate a Kubernetes-style object or namespace name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Validate a quota resource name such as `requests.cpu`,
/// `count/machines.compute` or `fast.storageclass.storage/requests.storage`.
/// Rules: `[a-z0-9./-]`, max 253 chars, at most one `/`, must start and end
/// with an alphanumeric character.
pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("resource name must not be empty");
    }
    if name.len() > 253 {
        bail!("resource name '{}' exceeds 253 characters", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '/' | '-'))
    {
        bail!(
            "resource name '{}' must contain only [a-z0-9./-]",
            name
        );
    }
    if name.matches('/').count() > 1 {
        bail!("resource name '{}' may contain at most one '/'", name);
    }
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        bail!(
            "resource name '{}' must start and end with a letter or digit",
            name
        );
    }
    Ok(())
}
