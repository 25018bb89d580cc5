//! Generic namespaced-element tree for Atom feed responses, plus the
//! extraction functions the rest of the crate needs from it.

use super::{Cell, ListEntry, NameId};
use crate::error::{AppError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const GS_NS: &str = "http://schemas.google.com/spreadsheets/2006";
/// Namespace of the per-column data elements in list feed entries.
pub const GSX_NS: &str = "http://schemas.google.com/spreadsheets/2006/extended";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = NsReader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_resolved_event_into(&mut buf)? {
                (ns, Event::Start(e)) => stack.push(element_from(ns, &e)?),
                (ns, Event::Empty(e)) => {
                    let element = element_from(ns, &e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                (_, Event::Text(t)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&t.unescape()?);
                    }
                }
                (_, Event::CData(c)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                (_, Event::End(_)) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| AppError::Xml("Unbalanced closing tag".to_string()))?;
                    if !element.children.is_empty() {
                        element.text = element.text.trim().to_string();
                    }
                    attach(&mut stack, &mut root, element)?;
                }
                (_, Event::Eof) => break,
                _ => (),
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(AppError::Xml("Unexpected end of document".to_string()));
        }
        root.ok_or_else(|| AppError::Xml("Empty document".to_string()))
    }

    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }

    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.in_namespace(namespace) && self.name == name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, name))
    }
}

fn element_from(ns: ResolveResult, start: &BytesStart) -> Result<Element> {
    let namespace = match ns {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        _ => None,
    };

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        namespace,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(AppError::Xml("Multiple root elements".to_string())),
    }
    Ok(())
}

/// Atom entries of a feed.
pub fn entries(feed: &Element) -> impl Iterator<Item = &Element> {
    feed.children_named(ATOM_NS, "entry")
}

/// Target of the feed's `rel="next"` link, if there are more pages.
pub fn next_link(feed: &Element) -> Option<String> {
    feed.children_named(ATOM_NS, "link")
        .find(|link| link.attr("rel") == Some("next"))
        .and_then(|link| link.attr("href"))
        .map(str::to_string)
}

/// Title and short id of a spreadsheet or worksheet entry.
///
/// The id is the last path segment of the entry's `<id>` URL.
pub fn name_id(entry: &Element) -> Result<NameId> {
    let name = entry
        .child(ATOM_NS, "title")
        .map(|title| title.text.clone())
        .ok_or_else(|| AppError::Xml("Entry has no title".to_string()))?;
    let id = entry
        .child(ATOM_NS, "id")
        .and_then(|id| id.text.trim().rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Xml(format!("Entry '{}' has no id", name)))?;

    Ok(NameId { name, id })
}

/// (tag, value) pairs of a list feed entry, in column order.
pub fn list_entry(entry: &Element) -> ListEntry {
    let values = entry
        .children
        .iter()
        .filter(|c| c.in_namespace(GSX_NS))
        .map(|c| (c.name.clone(), c.text.clone()))
        .collect();
    ListEntry { values }
}

/// Cells of a cells feed, in feed order.
pub fn cells(feed: &Element) -> Result<Vec<Cell>> {
    entries(feed)
        .filter_map(|entry| entry.child(GS_NS, "cell"))
        .map(|cell| -> Result<Cell> {
            let coordinate = |name: &str| -> Result<u32> {
                cell.attr(name)
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| AppError::Xml(format!("Cell has no valid '{}' attribute", name)))
            };
            Ok(Cell {
                row: coordinate("row")?,
                col: coordinate("col")?,
                text: cell.text.clone(),
            })
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_parse_resolves_namespaces() {
        let feed = Element::parse(LIST_FEED).unwrap();
        assert!(feed.is(ATOM_NS, "feed"));

        let entry = entries(&feed).next().unwrap();
        let amount = entry
            .children
            .iter()
            .find(|c| c.name == "amountspent")
            .unwrap();
        assert!(amount.in_namespace(GSX_NS));
        assert!(!entry.child(ATOM_NS, "title").unwrap().in_namespace(GSX_NS));
    }

    #[test]
    fn test_spreadsheet_name_ids() {
        let feed = Element::parse(SPREADSHEETS_FEED).unwrap();
        let pairs: Vec<NameId> = entries(&feed).map(|e| name_id(e).unwrap()).collect();

        assert_eq!(
            pairs,
            vec![
                NameId::new("Budget & Bills", "key1"),
                NameId::new("Weight", "key2"),
            ]
        );
    }

    #[test]
    fn test_next_link() {
        let feed = Element::parse(SPREADSHEETS_FEED).unwrap();
        assert_eq!(
            next_link(&feed).as_deref(),
            Some("https://spreadsheets.google.com/feeds/spreadsheets/private/full?start-index=3")
        );

        let feed = Element::parse(LIST_FEED).unwrap();
        assert_eq!(next_link(&feed), None);
    }

    #[test]
    fn test_column_tags_only_data_namespace() {
        let feed = Element::parse(LIST_FEED).unwrap();
        let entry = entries(&feed).next().unwrap();

        assert_eq!(
            list_entry(entry).tags().collect::<Vec<_>>(),
            vec!["amountspent", "date", "_cn6ca"]
        );
        assert_eq!(
            list_entry(entry).values,
            vec![
                ("amountspent".to_string(), "12.50".to_string()),
                ("date".to_string(), "2025-01-01".to_string()),
                ("_cn6ca".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_cells() {
        let feed = Element::parse(CELLS_FEED).unwrap();
        assert_eq!(
            cells(&feed).unwrap(),
            vec![
                Cell {
                    row: 1,
                    col: 1,
                    text: "Amount Spent".to_string()
                },
                Cell {
                    row: 1,
                    col: 2,
                    text: "Date".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_entry_without_id_is_error() {
        let feed = Element::parse(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><title>x</title></entry></feed>"#,
        )
        .unwrap();
        assert!(name_id(entries(&feed).next().unwrap()).is_err());
    }

    #[test]
    fn test_malformed_documents() {
        assert!(Element::parse("").is_err());
        assert!(Element::parse("<feed><entry></feed>").is_err());
    }
}
