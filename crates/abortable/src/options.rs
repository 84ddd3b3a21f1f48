use shared::domain::{ResetPolicy, TokenSupport};

use crate::cancellation::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Token handed to every generation instead of a freshly built one.
    ///
    /// A generation that is superseded or torn down before settling cancels this token, and
    /// a cancelled token stays cancelled: later generations settle as aborted right away.
    pub cancellation_token: Option<CancellationToken>,
    /// Kind of token built per generation when no `cancellation_token` is supplied.
    pub token_support: TokenSupport,
}

impl QueryOptions {
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    pub fn with_token_support(mut self, token_support: TokenSupport) -> Self {
        self.token_support = token_support;
        self
    }

    pub(crate) fn token_for_generation(&self) -> CancellationToken {
        match &self.cancellation_token {
            Some(token) => token.clone(),
            None => CancellationToken::for_support(self.token_support),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationOptions {
    pub reset_policy: ResetPolicy,
}

impl MutationOptions {
    pub fn with_reset_policy(mut self, reset_policy: ResetPolicy) -> Self {
        self.reset_policy = reset_policy;
        self
    }
}
