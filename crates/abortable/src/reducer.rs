use serde::{Serialize, Serializer};
use shared::error::{ErrorReport, OperationError};

/// Observable progress of an operation.
///
/// While `loading` is set, `data` and `error` are both empty. `resolved_count` only grows,
/// except through [`Event::Reset`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct State<T> {
    pub data: Option<T>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<OperationError>,
    pub loading: bool,
    pub resolved_count: u64,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
            resolved_count: 0,
        }
    }
}

impl<T> State<T> {
    pub fn apply(&mut self, event: Event<T>) {
        *self = reduce(std::mem::take(self), event);
    }

    pub fn is_settled(&self) -> bool {
        !self.loading && (self.data.is_some() || self.error.is_some())
    }
}

fn serialize_error<S>(error: &Option<OperationError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    error.as_ref().map(ErrorReport::from).serialize(serializer)
}

#[derive(Debug, Clone)]
pub enum Event<T> {
    Pending,
    Resolved(T),
    Rejected(OperationError),
    /// Only emitted by mutation controllers.
    Reset,
}

pub fn reduce<T>(state: State<T>, event: Event<T>) -> State<T> {
    match event {
        Event::Pending => State {
            data: None,
            error: None,
            loading: true,
            ..state
        },
        Event::Resolved(data) => State {
            data: Some(data),
            error: None,
            loading: false,
            resolved_count: state.resolved_count + 1,
        },
        Event::Rejected(error) => State {
            data: None,
            error: Some(error),
            loading: false,
            ..state
        },
        Event::Reset => State::default(),
    }
}
