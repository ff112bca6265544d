//! Markdown-like content renderer.
//!
//! Raw post text is mapped to display HTML by an ordered list of pattern
//! substitutions. Order matters: later rules must not corrupt the output of
//! earlier ones (bold before italic, headers after inline markup, and the
//! newline rule last).

use once_cell::sync::Lazy;
use regex::Regex;

// The `regex` crate has no look-around, so the guard against re-wrapping an
// already-emitted image tag consumes an optional `<img src="` prefix /
// `">` suffix and re-emits the whole match untouched when either is present.
static IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(<img src=")?!\[(.*?)\]\((.*?)\)(">)?"#).unwrap());
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.*?)\]\((https?://.*?)\)").unwrap());
static YOUTUBE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[youtube\]\((?:https?://)?(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/)?([a-zA-Z0-9_-]{11})\)",
    )
    .unwrap()
});
static EMBED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[embed\]\((https?://.*?)\)").unwrap());
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static STRIKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~(.*?)~~").unwrap());
static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`(.*?)`").unwrap());
static H3_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^### (.*)$").unwrap());
static H2_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^## (.*)$").unwrap());
static QUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^> (.*)$").unwrap());
static LIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^- (.*)$").unwrap());

/// Render raw post content to display HTML. Pure and deterministic; empty
/// input renders as the empty string.
pub fn render(raw: &str) -> String {
    // 1. Images: ![alt](url)
    let out = IMAGE_RE.replace_all(raw, |caps: &regex::Captures| {
        if caps.get(1).is_some() || caps.get(4).is_some() {
            // Already inside an emitted image tag; leave untouched.
            caps[0].to_string()
        } else {
            format!(r#"<img src="{}" alt="{}" class="img-fluid mb-2">"#, &caps[3], &caps[2])
        }
    });
    // 2. Links: [text](http(s)://url)
    let out = LINK_RE.replace_all(
        &out,
        r#"<a href="${2}" target="_blank" rel="noopener noreferrer">${1}</a>"#,
    ).into_owned();
    // 3. YouTube shorthand: bare 11-char id, watch?v= or youtu.be forms
    let out = YOUTUBE_RE.replace_all(
        &out,
        r#"<div class="embed-responsive embed-responsive-16by9 mb-2"><iframe class="embed-responsive-item" src="https://www.youtube.com/embed/${1}" allowfullscreen></iframe></div>"#,
    ).into_owned();
    // 4. Generic iframe embed: [embed](url)
    let out = EMBED_RE.replace_all(
        &out,
        r#"<div class="embed-responsive embed-responsive-16by9 mb-2"><iframe class="embed-responsive-item" src="${1}" allowfullscreen></iframe></div>"#,
    ).into_owned();
    // 5. Inline emphasis; bold first so it does not swallow italic markers
    let out = BOLD_RE.replace_all(&out, "<strong>${1}</strong>").into_owned();
    let out = ITALIC_RE.replace_all(&out, "<em>${1}</em>").into_owned();
    let out = STRIKE_RE.replace_all(&out, "<del>${1}</del>").into_owned();
    let out = CODE_RE.replace_all(&out, "<code>${1}</code>").into_owned();
    // 6-8. Line-anchored block markup
    let out = H3_RE.replace_all(&out, "<h3>${1}</h3>").into_owned();
    let out = H2_RE.replace_all(&out, "<h2>${1}</h2>").into_owned();
    let out = QUOTE_RE.replace_all(&out, "<blockquote>${1}</blockquote>").into_owned();
    let out = LIST_RE.replace_all(&out, "<li>${1}</li>").into_owned();
    // 9. Newlines to <br>, skipped when richer block markup is present
    if ["<pre", "<div", "<p"].iter().any(|tag| out.contains(tag)) {
        out
    } else {
        out.replace('\n', "<br>")
    }
}
