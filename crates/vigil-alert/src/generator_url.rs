use url::Url;

/// Builds the backlink to a rule's edit page that is embedded in
/// notifications.
///
/// `source` is the UI location captured when the rule was saved. An empty
/// or unparseable source yields an empty string, meaning "no link". A
/// source captured on the creation page (`.../alerts/new`) keeps its
/// prefix up to the last `new`. Anything else is reduced to scheme, host
/// and port; the query string is dropped to keep payloads short. A port
/// written in the source is kept even when it is the scheme's default.
///
/// # Examples
///
/// ```
/// use vigil_alert::generator_url::prepare_rule_generator_url;
///
/// assert_eq!(
///     prepare_rule_generator_url("r1", "http://host:3301/alerts/new?x=1"),
///     "http://host:3301/alerts/edit?ruleId=r1"
/// );
/// assert_eq!(prepare_rule_generator_url("r1", "not a url"), "");
/// ```
pub fn prepare_rule_generator_url(rule_id: &str, source: &str) -> String {
    if source.is_empty() {
        return String::new();
    }

    let Ok(parsed) = Url::parse(source) else {
        return String::new();
    };

    if let Some(idx) = source.rfind("new") {
        return format!("{}edit?ruleId={rule_id}", &source[..idx]);
    }

    let Some(host) = parsed.host_str() else {
        return String::new();
    };

    match explicit_port(source) {
        Some(port) => format!(
            "{}://{host}:{port}/alerts/edit?ruleId={rule_id}",
            parsed.scheme()
        ),
        None => format!("{}://{host}/alerts/edit?ruleId={rule_id}", parsed.scheme()),
    }
}

/// Port as written in the authority of `source`, if any.
fn explicit_port(source: &str) -> Option<&str> {
    let (_, rest) = source.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let after_host = host_port
        .rfind(']')
        .map_or(host_port, |idx| &host_port[idx + 1..]);
    after_host
        .rsplit_once(':')
        .map(|(_, port)| port)
        .filter(|port| !port.is_empty())
}
