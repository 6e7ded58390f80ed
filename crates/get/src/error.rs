use std::fmt;

use orka_core::FetchError;
use orka_printers::PrintError;

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error(transparent)]
    Print(#[from] PrintError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Sort(String),
    #[error("watch stream failed: {0}")]
    WatchStream(String),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl GetError {
    /// True when every underlying failure is a "not found".
    pub fn is_not_found(&self) -> bool {
        match self {
            GetError::Fetch(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Collected errors, flattened and de-duplicated by message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateError {
    messages: Vec<String>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: impl Into<GetError>) {
        match err.into() {
            GetError::Aggregate(nested) => nested.messages.into_iter().for_each(|m| self.push_message(m)),
            other => self.push_message(other.to_string()),
        }
    }

    fn push_message(&mut self, msg: String) {
        if !self.messages.contains(&msg) {
            self.messages.push(msg);
        }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// `Ok` when nothing was collected.
    pub fn into_result(self) -> Result<(), GetError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(GetError::Aggregate(self))
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.messages.as_slice() {
            [] => Ok(()),
            [one] => f.write_str(one),
            many => write!(f, "[{}]", many.join(", ")),
        }
    }
}

impl std::error::Error for AggregateError {}

impl<E: Into<GetError>> FromIterator<E> for AggregateError {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut agg = AggregateError::new();
        iter.into_iter().for_each(|e| agg.push(e));
        agg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_and_dedups_in_first_seen_order() {
        let mut inner = AggregateError::new();
        inner.push(GetError::Validation("b".into()));
        inner.push(GetError::Validation("a".into()));

        let mut agg = AggregateError::new();
        agg.push(GetError::Validation("a".into()));
        agg.push(inner);
        agg.push(FetchError::Transport("b".into()));
        assert_eq!(agg.messages(), &["a".to_string(), "b".to_string()]);
        assert_eq!(agg.to_string(), "[a, b]");
    }

    #[test]
    fn single_message_displays_bare() {
        let agg: AggregateError = vec![FetchError::NotFound("pods \"x\"".into())].into_iter().collect();
        assert_eq!(agg.to_string(), "pods \"x\" not found");
        assert!(AggregateError::new().into_result().is_ok());
        assert!(agg.into_result().is_err());
    }
}
