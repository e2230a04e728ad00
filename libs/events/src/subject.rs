//! Subject hierarchy and wildcard matching.

/// Well-known subjects. Publishers use the concrete per-service subjects;
/// `ALL_SERVICES` is the subscription pattern covering every core service.
pub mod subjects {
    pub const APPLICATION: &str = "stellar.services.application.v1";
    pub const NAMESERVER: &str = "stellar.services.nameserver.v1";
    pub const PROXY: &str = "stellar.services.proxy.v1";
    pub const ALL_SERVICES: &str = "stellar.services.>";
}

/// Match a dot-separated subject against a pattern.
///
/// Segments compare literally except for a trailing `>`, which matches one or
/// more remaining segments. `>` anywhere else never matches.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_segs = pattern.split('.').peekable();
    let mut subject_segs = subject.split('.');

    loop {
        match (pattern_segs.next(), subject_segs.next()) {
            (Some(">"), Some(_)) => return pattern_segs.peek().is_none(),
            (Some(p), Some(s)) => {
                if p != s {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}
