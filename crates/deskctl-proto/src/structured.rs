// ── Structured-text parser ──
//
// Reassembled display and key-module content is a line-oriented
// `key:value` mini-language:
//
//   object:
//   name:Toast
//   caption:Call ended
//   subitem:
//   name:OperaListBoxItem
//   string0:Redial
//   endsubitem:
//   end:
//
// The parser is single pass with no lookahead. Malformed control sequences
// produce a partial model; records outside any object are dropped.

use indexmap::IndexMap;
use serde::Serialize;

/// Ordered key/value fields of one record.
pub type Fields = IndexMap<String, String>;

/// One top-level display object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayObject {
    #[serde(flatten)]
    pub fields: Fields,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Fields>,
}

impl DisplayObject {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Object name → object, in the order the device sent them.
pub type DisplayModel = IndexMap<String, DisplayObject>;

/// One top-level key-module object; subitems are filed by row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyModuleObject {
    #[serde(flatten)]
    pub fields: Fields,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub rows: IndexMap<String, Fields>,
}

pub type KeyModuleModel = IndexMap<String, KeyModuleObject>;

/// A plain (non-control) record seen while parsing display content.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub key: &'a str,
    pub value: &'a str,
    /// Name of the enclosing subitem, when inside one.
    pub subitem: Option<&'a str>,
}

/// Observes every plain record of a display parse, in order.
pub trait RecordVisitor {
    fn record(&mut self, record: Record<'_>);
}

impl<F> RecordVisitor for F
where
    F: FnMut(Record<'_>),
{
    fn record(&mut self, record: Record<'_>) {
        self(record);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Outside,
    Object,
    Subitem,
}

/// Split content into trimmed `(key, value)` pairs. Lines are separated by
/// CR and/or LF; the key ends at the first `:`.
fn records(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.split(['\r', '\n'])
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.split_once(':') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line.trim(), ""),
        })
}

/// Parse display content, reporting plain records to `visitor`.
pub fn parse_display(text: &str, visitor: &mut dyn RecordVisitor) -> DisplayModel {
    let mut model = DisplayModel::new();
    let mut mode = Mode::Outside;
    let mut current: Option<String> = None;
    let mut subitem = Fields::new();
    let mut subitem_name: Option<String> = None;

    for (key, value) in records(text) {
        match (key, mode) {
            ("object", _) => {
                mode = Mode::Object;
                continue;
            }
            ("subitem", _) => {
                mode = Mode::Subitem;
                subitem = Fields::new();
                subitem_name = None;
                continue;
            }
            ("name", Mode::Object) => {
                model.insert(value.to_owned(), DisplayObject::default());
                current = Some(value.to_owned());
                continue;
            }
            ("name", Mode::Subitem) => subitem_name = Some(value.to_owned()),
            ("endsubitem", _) => {
                if let Some(object) = current.as_ref().and_then(|name| model.get_mut(name)) {
                    object.items.push(std::mem::take(&mut subitem));
                }
                subitem_name = None;
                mode = Mode::Object;
                continue;
            }
            ("end", _) => {
                mode = Mode::Outside;
                continue;
            }
            _ => {}
        }

        match mode {
            Mode::Object => {
                if let Some(object) = current.as_ref().and_then(|name| model.get_mut(name)) {
                    object.fields.insert(key.to_owned(), value.to_owned());
                }
            }
            Mode::Subitem => {
                subitem.insert(key.to_owned(), value.to_owned());
            }
            Mode::Outside => {}
        }

        visitor.record(Record {
            key,
            value,
            subitem: subitem_name.as_deref().filter(|_| mode == Mode::Subitem),
        });
    }

    model
}

/// Parse key-module content. Subitems are filed under their `row` value;
/// a subitem without one takes the next free position.
pub fn parse_key_module(text: &str) -> KeyModuleModel {
    let mut model = KeyModuleModel::new();
    let mut mode = Mode::Outside;
    let mut current: Option<String> = None;
    let mut subitem = Fields::new();
    let mut row: Option<String> = None;

    for (key, value) in records(text) {
        match (key, mode) {
            ("object", _) => mode = Mode::Object,
            ("subitem", _) => {
                mode = Mode::Subitem;
                subitem = Fields::new();
                row = None;
            }
            ("name", Mode::Object) => {
                model.insert(value.to_owned(), KeyModuleObject::default());
                current = Some(value.to_owned());
            }
            ("name" | "row", Mode::Subitem) => {
                if key == "row" {
                    row = Some(value.to_owned());
                }
            }
            ("endsubitem", _) => {
                if let Some(object) = current.as_ref().and_then(|name| model.get_mut(name)) {
                    let slot = row.take().unwrap_or_else(|| object.rows.len().to_string());
                    object.rows.insert(slot, std::mem::take(&mut subitem));
                }
                mode = Mode::Object;
            }
            ("end", _) => mode = Mode::Outside,
            (_, Mode::Object) => {
                if let Some(object) = current.as_ref().and_then(|name| model.get_mut(name)) {
                    object.fields.insert(key.to_owned(), value.to_owned());
                }
            }
            (_, Mode::Subitem) => {
                subitem.insert(key.to_owned(), value.to_owned());
            }
            (_, Mode::Outside) => {}
        }
    }

    model
}
