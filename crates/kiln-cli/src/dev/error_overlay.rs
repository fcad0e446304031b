//! Markup the hot client shows over the page when a build fails.

/// Overlay markup for `error`. The message is escaped; the markup carries
/// its own styles and no script.
pub fn error_overlay(error: &str) -> String {
    format!(
        concat!(
            "<div style=\"position:fixed;inset:0;z-index:2147483647;overflow:auto;",
            "background:rgba(20,20,20,0.94);color:#f4f4f4;padding:2rem;",
            "font:14px/1.5 ui-monospace,SFMono-Regular,Menlo,monospace\">",
            "<h2 style=\"margin:0 0 1rem;color:#ff6b6b;font-size:18px\">Build failed</h2>",
            "<pre style=\"white-space:pre-wrap;margin:0\">{}</pre>",
            "<p style=\"margin-top:1rem;opacity:0.7\">",
            "The page keeps running the last successful build. ",
            "Fix the error and save to rebuild.</p></div>"
        ),
        html_escape(error)
    )
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("a & b"), "a &amp; b");
        assert_eq!(
            html_escape("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"
        );
        assert_eq!(html_escape("say \"hi\""), "say &quot;hi&quot;");
        assert_eq!(html_escape("plain"), "plain");
    }

    #[test]
    fn test_overlay_escapes_message() {
        let html = error_overlay("unexpected token `<` in src/index.js");
        assert!(html.contains("Build failed"));
        assert!(html.contains("unexpected token `&lt;` in src/index.js"));
        assert!(!html.contains("<script"));
    }
}
