//! Fault isolation for watch-mode pipelines.
//!
//! A failing transform is turned into a [`Diagnostic`] on a side channel
//! instead of an error on the control-flow path, so one bad source file
//! cannot end a watch session.

use std::{
    fmt,
    io::{self, Write},
    sync::Arc,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: String,
    pub message: String,
}

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Logs the diagnostic and rings the terminal bell.
#[derive(Debug, Default)]
pub struct TerminalSink;

impl DiagnosticSink for TerminalSink {
    fn report(&self, diagnostic: Diagnostic) {
        let mut stderr = io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
        tracing::error!("[{}] {}", diagnostic.stage, diagnostic.message);
    }
}

/// Message of an error value, or its debug form when the message is empty.
pub fn extract_message<E: fmt::Display + fmt::Debug>(err: &E) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        format!("{:?}", err)
    } else {
        message
    }
}

#[derive(Clone)]
pub struct IsolatedStage {
    name: String,
    sink: Arc<dyn DiagnosticSink>,
}

impl IsolatedStage {
    pub fn new(name: impl Into<String>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            name: name.into(),
            sink,
        }
    }

    /// Passes a successful value through. An error is reported and
    /// swallowed; the caller carries on with the next input.
    pub fn absorb<T, E>(&self, result: Result<T, E>) -> Option<T>
    where
        E: fmt::Display + fmt::Debug,
    {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.sink.report(Diagnostic {
                    stage: self.name.clone(),
                    message: extract_message(&err),
                });
                None
            }
        }
    }
}

impl fmt::Debug for IsolatedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolatedStage").field("name", &self.name).finish()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Keeps diagnostics in memory for assertions.
    #[derive(Debug, Default)]
    pub struct MemorySink {
        diagnostics: Mutex<Vec<Diagnostic>>,
    }

    impl MemorySink {
        pub fn diagnostics(&self) -> Vec<Diagnostic> {
            self.diagnostics.lock().clone()
        }
    }

    impl DiagnosticSink for MemorySink {
        fn report(&self, diagnostic: Diagnostic) {
            self.diagnostics.lock().push(diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemorySink;
    use super::*;

    #[derive(Debug)]
    struct Silent;

    impl fmt::Display for Silent {
        fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
            Ok(())
        }
    }

    fn transform(input: &str) -> Result<String, String> {
        if input.contains('{') && !input.contains('}') {
            Err(format!("unclosed block in `{}`", input))
        } else {
            Ok(input.to_uppercase())
        }
    }

    #[test]
    fn failing_input_does_not_stop_later_inputs() {
        let sink = Arc::new(MemorySink::default());
        let stage = IsolatedStage::new("sass", sink.clone());

        let outputs: Vec<String> = ["a { }", "b {", "c { }"]
            .into_iter()
            .filter_map(|input| stage.absorb(transform(input)))
            .collect();

        assert_eq!(outputs, vec!["A { }", "C { }"]);
        assert_eq!(
            sink.diagnostics(),
            vec![Diagnostic {
                stage: "sass".to_string(),
                message: "unclosed block in `b {`".to_string(),
            }]
        );
    }

    #[test]
    fn empty_message_falls_back_to_raw_value() {
        assert_eq!(extract_message(&Silent), "Silent");
        assert_eq!(extract_message(&"plain"), "plain");
    }
}
