use std::collections::BTreeMap;

/// Context information for log messages
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "arbiter", "phase", "virtuals")
    pub component: String,
    /// Identifier of the control cycle the message belongs to
    pub cycle_id: Option<String>,
    /// Additional context fields, emitted in key order
    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            cycle_id: None,
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn with_cycle_id(mut self, cycle_id: String) -> Self {
        self.cycle_id = Some(cycle_id);
        self
    }

    /// Add extra field
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }
}

// component and cycle_id are emitted as separate tracing fields
macro_rules! emit {
    ($level:ident, $logger:expr, $message:expr) => {{
        let ctx = &$logger.context;
        tracing::$level!(
            component = %ctx.component,
            cycle_id = ctx.cycle_id.as_deref().unwrap_or("-"),
            extra = %$logger.extra(),
            "{}",
            $message
        );
    }};
}

/// Structured logger with context
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    pub fn info(&self, message: &str) {
        emit!(info, self, message);
    }

    pub fn warn(&self, message: &str) {
        emit!(warn, self, message);
    }

    pub fn error(&self, message: &str) {
        emit!(error, self, message);
    }

    pub fn debug(&self, message: &str) {
        emit!(debug, self, message);
    }

    pub fn trace(&self, message: &str) {
        emit!(trace, self, message);
    }

    /// Same component, scoped to one control cycle
    pub fn for_cycle(&self, cycle_id: &str) -> Self {
        Self::new(self.context.clone().with_cycle_id(cycle_id.to_string()))
    }

    fn extra(&self) -> String {
        self.context
            .extra_fields
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_scope_keeps_component_and_fields() {
        let base = get_logger_with_context(
            LogContext::new("manager").with_field("site", "home".to_string()),
        );
        let scoped = base.for_cycle("abc");
        assert_eq!(scoped.context.component, "manager");
        assert_eq!(scoped.context.cycle_id.as_deref(), Some("abc"));
        assert_eq!(scoped.extra(), "site=home");
        assert!(base.context.cycle_id.is_none());
    }
}
