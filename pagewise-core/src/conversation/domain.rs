/// Key used for pages without a host, such as file:// URLs
const LOCAL_DOMAIN: &str = "local";

/// Normalize a URL or bare host into the domain key conversations are stored under
///
/// Scheme, credentials, port, path, query and a leading `www.` are dropped and
/// the host is lowercased.
pub fn domain_key(input: &str) -> String {
    let trimmed = input.trim();
    let rest = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let authority = authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority);

    let host = if authority.starts_with('[') {
        // IPv6 literal keeps its brackets
        match authority.find(']') {
            Some(end) => &authority[..=end],
            None => authority,
        }
    } else {
        authority.split(':').next().unwrap_or("")
    };

    let host = host.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);

    if host.is_empty() {
        LOCAL_DOMAIN.to_string()
    } else {
        host
    }
}
