use pulldown_cmark::{html, Options, Parser};

const SOURCE_OPEN: &str = r#"<div class="source-bitbucket">"#;
const SOURCE_CLOSE: &str = "</div>";

pub fn markdown_to_html(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(source, options);
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out
}

/// Renders Bitbucket markdown and wraps it in the origin container.
pub fn render_source_html(source: &str) -> String {
    format!("{SOURCE_OPEN}{}{SOURCE_CLOSE}", markdown_to_html(source))
}
