//! Blog markdown rendering.

use comrak::{Options, markdown_to_html};

/// Render a post body to HTML with GitHub Flavored Markdown extensions.
///
/// Raw HTML in the source is escaped, so a post cannot inject scripts into
/// the storefront.
#[must_use]
pub fn render(content: &str) -> String {
    let mut options = Options::default();

    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.extension.header_ids = Some(String::new());

    markdown_to_html(content, &options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_gfm() {
        let html = render("# Hạt điều\n\n| loại | giá |\n|---|---|\n| W320 | 250k |\n");
        assert!(html.contains("<h1>"));
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_raw_html_is_not_passed_through() {
        let html = render("<script>alert(1)</script>\n\nxin chào");
        assert!(!html.contains("<script>"));
        assert!(html.contains("xin chào"));
    }
}
