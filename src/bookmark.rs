use std::ops::Range;

use roxmltree::{Document, Node};

use crate::error::Error;
use crate::model::BookmarkEdit;
use crate::template::escape_value;

const TEXT_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:text:1.0";

fn is_text<'a>(node: Node<'a, 'a>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(TEXT_NS)
}

fn named<'a>(node: Node<'a, 'a>, kind: &str, bookmark: &str) -> bool {
    is_text(node, kind) && node.attribute((TEXT_NS, "name")) == Some(bookmark)
}

fn find_bookmark<'a>(doc: &'a Document<'a>, bookmark: &str) -> Option<Node<'a, 'a>> {
    doc.descendants()
        .find(|n| named(*n, "bookmark-start", bookmark) || named(*n, "bookmark", bookmark))
}

fn text_prefix(node: Node) -> String {
    node.lookup_prefix(TEXT_NS).unwrap_or("text").to_string()
}

fn span(prefix: &str, text: &str) -> String {
    format!("<{prefix}:span>{text}</{prefix}:span>")
}

/// Start tag of `node` as written in the source, without the closing `>` or `/>`.
fn raw_start_tag<'a>(xml: &'a str, node: Node) -> &'a str {
    let tag = &xml[node.range()];
    let mut quote: Option<char> = None;
    for (i, c) in tag.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return tag[..i].trim_end_matches('/').trim_end(),
            (None, _) => {}
        }
    }
    tag
}

fn qualified_name(start_tag: &str) -> &str {
    let body = start_tag.trim_start_matches('<');
    let end = body
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(body.len());
    &body[..end]
}

fn populate(doc: &Document, bookmark: &str, text: &str) -> Result<(Range<usize>, String), Error> {
    let node = find_bookmark(doc, bookmark).ok_or_else(|| Error::BookmarkNotFound(bookmark.into()))?;
    let value = escape_value(bookmark, text)?;
    let content = span(&text_prefix(node), &value);
    let after = node.range().end;

    if is_text(node, "bookmark") {
        return Ok((after..after, content));
    }

    if let Some(end) = node
        .next_siblings()
        .find(|n| named(*n, "bookmark-end", bookmark))
    {
        return Ok((after..end.range().start, content));
    }

    // Bookmark ends in another paragraph: replace the element right after the start.
    match node.next_siblings().skip(1).find(|n| n.is_element()) {
        Some(next) => Ok((next.range(), content)),
        None => Ok((after..after, content)),
    }
}

fn paragraph_after(
    xml: &str,
    doc: &Document,
    bookmark: &str,
    text: &str,
) -> Result<(Range<usize>, String), Error> {
    let node = find_bookmark(doc, bookmark).ok_or_else(|| Error::BookmarkNotFound(bookmark.into()))?;
    let paragraph = node
        .ancestors()
        .find(|n| is_text(*n, "p") || is_text(*n, "h"))
        .ok_or_else(|| Error::BookmarkNotFound(bookmark.into()))?;
    let value = escape_value(bookmark, text)?;
    let start_tag = raw_start_tag(xml, paragraph);
    let name = qualified_name(start_tag);
    let at = paragraph.range().end;
    Ok((at..at, format!("{start_tag}>{value}</{name}>")))
}

/// Apply bookmark edits to `xml`. Every edit is located against the
/// unmodified markup, then all edits are spliced back to front.
pub(crate) fn apply(xml: &str, edits: &[BookmarkEdit]) -> Result<String, Error> {
    if edits.is_empty() {
        return Ok(xml.to_string());
    }
    let doc = Document::parse(xml)?;

    let mut splices: Vec<(Range<usize>, String, &str)> = Vec::with_capacity(edits.len());
    let mut populated: Vec<&str> = Vec::new();
    for edit in edits {
        let (range, replacement, bookmark) = match edit {
            BookmarkEdit::Populate { bookmark, text } => {
                if populated.contains(&bookmark.as_str()) {
                    return Err(Error::ConflictingBookmarkEdits(bookmark.clone()));
                }
                populated.push(bookmark);
                let (range, replacement) = populate(&doc, bookmark, text)?;
                (range, replacement, bookmark.as_str())
            }
            BookmarkEdit::ParagraphAfter { bookmark, text } => {
                let (range, replacement) = paragraph_after(xml, &doc, bookmark, text)?;
                (range, replacement, bookmark.as_str())
            }
        };
        log::debug!("bookmark edit {edit:?} at {range:?}");
        splices.push((range, replacement, bookmark));
    }

    splices.sort_by_key(|(range, _, _)| range.start);
    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;
    for (range, replacement, bookmark) in splices {
        if range.start < cursor {
            return Err(Error::ConflictingBookmarkEdits(bookmark.to_string()));
        }
        out.push_str(&xml[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&xml[cursor..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0"><office:body><office:text><text:p text:style-name="P1">The <text:bookmark-start text:name="fox"/><text:s/><text:bookmark-end text:name="fox"/> fox jumps over the <text:bookmark text:name="dog"/> dog.</text:p></office:text></office:body></office:document-content>"#;

    fn populate_edit(bookmark: &str, text: &str) -> BookmarkEdit {
        BookmarkEdit::Populate {
            bookmark: bookmark.into(),
            text: text.into(),
        }
    }

    #[test]
    fn populates_ranged_bookmark() {
        let out = apply(DOC, &[populate_edit("fox", "quick brown")]).unwrap();
        assert!(out.contains(
            r#"<text:bookmark-start text:name="fox"/><text:span>quick brown</text:span><text:bookmark-end text:name="fox"/>"#
        ));
        assert!(!out.contains("<text:s/>"));
        Document::parse(&out).unwrap();
    }

    #[test]
    fn populates_collapsed_bookmark() {
        let out = apply(DOC, &[populate_edit("dog", "lazy")]).unwrap();
        assert!(out.contains(r#"<text:bookmark text:name="dog"/><text:span>lazy</text:span> dog."#));
    }

    #[test]
    fn applies_several_edits_against_original_positions() {
        let out = apply(
            DOC,
            &[populate_edit("dog", "lazy"), populate_edit("fox", "quick brown")],
        )
        .unwrap();
        let fox = out.find("quick brown").unwrap();
        let dog = out.find("lazy").unwrap();
        assert!(fox < dog);
        Document::parse(&out).unwrap();
    }

    #[test]
    fn inserts_paragraph_with_same_style() {
        let edit = BookmarkEdit::ParagraphAfter {
            bookmark: "fox".into(),
            text: "No one expects the Spanish Inquisition!".into(),
        };
        let out = apply(DOC, &[edit]).unwrap();
        assert!(out.contains(
            r#"dog.</text:p><text:p text:style-name="P1">No one expects the Spanish Inquisition!</text:p></office:text>"#
        ));
        Document::parse(&out).unwrap();
    }

    #[test]
    fn escapes_bookmark_text() {
        let out = apply(DOC, &[populate_edit("fox", "<b>&")]).unwrap();
        assert!(out.contains("<text:span>&lt;b&gt;&amp;</text:span>"));
    }

    #[test]
    fn populating_a_bookmark_twice_is_an_error() {
        let err = apply(DOC, &[populate_edit("fox", "quick"), populate_edit("fox", "slow")])
            .unwrap_err();
        assert!(matches!(err, Error::ConflictingBookmarkEdits(ref name) if name == "fox"));
    }

    #[test]
    fn missing_bookmark_is_an_error() {
        let err = apply(DOC, &[populate_edit("cat", "x")]).unwrap_err();
        assert!(matches!(err, Error::BookmarkNotFound(ref name) if name == "cat"));
    }

    #[test]
    fn raw_start_tag_ignores_gt_in_attributes() {
        let xml = r#"<a><p title="1 > 0" x='y'>t</p></a>"#;
        let doc = Document::parse(xml).unwrap();
        let p = doc.descendants().find(|n| n.has_tag_name("p")).unwrap();
        let tag = raw_start_tag(xml, p);
        assert_eq!(tag, r#"<p title="1 > 0" x='y'"#);
        assert_eq!(qualified_name(tag), "p");
    }
}
