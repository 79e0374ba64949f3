use super::Diagnostic;
use crate::ast::SourceMap;

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, style: &str, s: &str) -> String {
        if self.use_color { format!("\x1b[{style}m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    fn bold_red(&self, s: &str) -> String {
        self.paint("1;31", s)
    }

    fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        // "error[SPD-P001]: message"
        let head = match d.code {
            Some(code) => format!("error[{code}]"),
            None => "error".to_string(),
        };
        out.push_str(&format!("{}: {}\n", self.bold_red(&head), self.bold(&d.message)));

        if let (Some(label), Some(source)) = (&d.label, &d.source) {
            let map = SourceMap::new(source);
            let (line, col) = map.lookup(label.span.start);
            let line_text = map.line_text(line);

            out.push_str(&format!("  {} {}:{}\n", self.cyan("-->"), line, col));

            let gutter = line.to_string().len();
            let pipe = self.cyan("|");
            let pad = " ".repeat(gutter);

            out.push_str(&format!("{pad} {pipe}\n"));
            let line_num = self.cyan(&format!("{line:>gutter$}"));
            out.push_str(&format!("{line_num} {pipe} {line_text}\n"));

            // Carets stop at the end of the line for spans that run past it
            let (end_line, end_col) = map.lookup(label.span.end);
            let end_col = if end_line == line {
                end_col
            } else {
                line_text.chars().count() + 1
            };
            let span_len = end_col.saturating_sub(col).max(1);
            let carets = self.bold_red(&"^".repeat(span_len));
            let indent = " ".repeat(col.saturating_sub(1));
            if label.message.is_empty() {
                out.push_str(&format!("{pad} {pipe} {indent}{carets}\n"));
            } else {
                out.push_str(&format!("{pad} {pipe} {indent}{carets} {}\n", self.bold_red(&label.message)));
            }
            out.push_str(&format!("{pad} {pipe}\n"));
        }

        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} help: {}\n", self.dim("="), suggestion));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn make_diag(source: &str, start: usize, end: usize) -> Diagnostic {
        Diagnostic::error("expected expression")
            .with_code("SPD-P006")
            .with_span(Span { start, end }, "here")
            .with_source(source.to_string())
            .with_note("while parsing a call")
            .with_suggestion("remove the trailing comma")
    }

    #[test]
    fn render_header_with_code() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&make_diag("f(1,);", 4, 5));
        assert!(out.starts_with("error[SPD-P006]: expected expression\n"), "{out}");
    }

    #[test]
    fn render_location_line_and_carets() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&make_diag("f(1,);", 4, 5));
        assert!(out.contains("--> 1:5"), "{out}");
        assert!(out.contains("1 | f(1,);"), "{out}");
        assert!(out.contains("  |     ^ here"), "{out}");
    }

    #[test]
    fn render_note_and_help() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&make_diag("f(1,);", 4, 5));
        assert!(out.contains("note: while parsing a call"));
        assert!(out.contains("help: remove the trailing comma"));
    }

    #[test]
    fn render_without_source_has_no_snippet() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&Diagnostic::error("global not initialized (slot 3)"));
        assert_eq!(out, "error: global not initialized (slot 3)\n");
    }

    #[test]
    fn color_toggle() {
        let d = make_diag("f(1,);", 4, 5);
        assert!(AnsiRenderer { use_color: true }.render(&d).contains("\x1b["));
        assert!(!AnsiRenderer { use_color: false }.render(&d).contains("\x1b["));
    }

    #[test]
    fn second_line_is_located() {
        let source = "let a = 1;\nlet = 2;";
        let d = Diagnostic::error("expected identifier")
            .with_span(Span { start: 15, end: 16 }, "")
            .with_source(source.to_string());
        let out = AnsiRenderer { use_color: false }.render(&d);
        assert!(out.contains("--> 2:5"), "{out}");
        assert!(out.contains("2 | let = 2;"), "{out}");
    }

    #[test]
    fn caret_length_matches_span() {
        let d = Diagnostic::error("bad")
            .with_span(Span { start: 4, end: 9 }, "")
            .with_source("let hello = 1;".to_string());
        let out = AnsiRenderer { use_color: false }.render(&d);
        assert!(out.contains("^^^^^\n"), "{out}");
    }
}
