/// Parsed form of the `assoc_forget` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgetPolicy {
    /// `all`
    All,
    /// `oldest` or `oldest:N`. An unparsable count means one.
    Oldest(usize),
    /// Anything else names a key.
    Key(String),
}

impl ForgetPolicy {
    pub fn parse(key_or_policy: &str) -> Self {
        match key_or_policy {
            "all" => ForgetPolicy::All,
            "oldest" => ForgetPolicy::Oldest(1),
            other => match other.strip_prefix("oldest:") {
                Some(count) => ForgetPolicy::Oldest(count.trim().parse().unwrap_or(1)),
                None => ForgetPolicy::Key(other.to_string()),
            },
        }
    }
}
