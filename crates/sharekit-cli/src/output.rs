//! Output formatting for human and JSON modes

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Human-readable output with check marks and indentation
pub struct HumanFormatter {
    quiet: bool,
}

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {message}");
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }
    fn info(&self, message: &str) {
        if !self.quiet {
            println!("  {message}");
        }
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// One JSON document per command on stdout
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", serde_json::json!({ "success": true, "message": message }));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", serde_json::json!({ "success": false, "error": message }));
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

pub fn get_formatter(format: OutputFormat, quiet: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter { quiet }),
    }
}
