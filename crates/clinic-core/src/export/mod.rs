//! Read-only views for the admin dashboard and the student/parent portals.

mod audit;
mod case_summary;
mod dashboard;

pub use audit::*;
pub use case_summary::*;
pub use dashboard::*;

/// Quote a CSV field when it holds a separator, quote or line break.
fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_escaping() {
        assert_eq!(escape_csv("simple"), "simple");
        assert_eq!(escape_csv("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(escape_csv("سطر\nثاني"), "\"سطر\nثاني\"");
    }
}
