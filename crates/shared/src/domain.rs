use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

id_newtype!(GenerationId);

impl GenerationId {
    pub const FIRST: Self = Self(1);

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// How a query controller builds the cancellation token for each generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSupport {
    /// Tokens that can be cancelled and notify their observers.
    #[default]
    Native,
    /// No-op tokens: cancelling does nothing and nothing is ever notified.
    Inert,
}

/// What happens to a mutation that is still in flight when its state is reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// The in-flight settlement is still applied and may re-populate the state.
    #[default]
    KeepInFlight,
    /// Settlements of calls started before the reset are not applied to the state.
    /// The caller still receives the outcome.
    DiscardInFlight,
}
