use uuid::Uuid;

/// Identity of this process towards the hub, created once and shared by
/// every client that talks to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    user_agent: String,
}

impl Session {
    pub fn new() -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let user_agent = format!(
            "hubcache/{}; rust; session_id/{}",
            env!("CARGO_PKG_VERSION"),
            id
        );
        Self { id, user_agent }
    }

    /// Random hex id without dashes.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Value of the `User-Agent` header, e.g.
    /// `hubcache/0.1.0; rust; session_id/3f2a…`.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
