/// Parse and validate a storefront base URL.
///
/// The URL must use `http://` or `https://` and name a host. Trailing
/// slashes are removed so endpoint paths can be appended directly.
///
/// # Examples
///
/// Valid: `https://shop.example.com`, `http://localhost:9292/`
/// Invalid: `shop.example.com`, `ftp://shop.example.com`, `https://`
///
/// # Errors
///
/// Returns an error message if the URL is unusable.
pub fn parse_host(s: &str) -> Result<String, String> {
    let trimmed = s.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err("Host cannot be empty".to_string());
    }

    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| format!("Host must start with http:// or https://: '{}'", s))?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(format!("Host is missing a server name: '{}'", s));
    }

    if rest.chars().any(char::is_whitespace) {
        return Err(format!("Host cannot contain whitespace: '{}'", s));
    }

    Ok(trimmed.to_string())
}
