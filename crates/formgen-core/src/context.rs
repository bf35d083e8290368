//! Per-request inputs

use formgen_session::{SessionContext, SessionId};
use std::sync::Arc;

/// Who is asking, and which session they are in
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session: Arc<dyn SessionContext>,
    pub user_id: String,
    /// Token forwarded to the forms repository
    pub auth_token: String,
}

impl RequestContext {
    /// Create context
    #[must_use]
    pub fn new(
        session: Arc<dyn SessionContext>,
        user_id: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            session,
            user_id: user_id.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Session ID
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }
}
