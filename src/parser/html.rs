use scraper::{ElementRef, Html, Node, Selector};

pub fn parse(html: &str) -> Html {
    Html::parse_document(html)
}

pub fn select_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(css).ok()?;
    doc.select(&sel).next()
}

pub fn select_all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => doc.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

pub fn attr(doc: &Html, css: &str, name: &str) -> Option<String> {
    select_first(doc, css)
        .and_then(|el| el.value().attr(name))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// All text under `el`, with `<br>` rendered as a line break.
pub fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(t) => out.push_str(&t.text),
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

/// Text nodes that are direct children of `el` (anchor and label text excluded), trimmed.
/// Tokens that carry nothing once whitespace, `:` and the `/10` suffix are removed are dropped.
pub fn direct_text_tokens(el: ElementRef<'_>) -> Vec<String> {
    el.children()
        .filter_map(|child| match child.value() {
            Node::Text(t) => Some(t.text.trim().to_string()),
            _ => None,
        })
        .filter(|t| {
            let bare = t.trim_start_matches(':').trim();
            !bare.is_empty() && bare != "/10"
        })
        .collect()
}

pub fn anchor_texts(el: ElementRef<'_>) -> Vec<String> {
    let Ok(sel) = Selector::parse("a") else {
        return Vec::new();
    };
    el.select(&sel)
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
