//! The `mcrdata.xml` sidecar document of a file collection.
//!
//! It records what the filesystem cannot: node kind, MD5 checksums of files
//! and per-language labels.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <collection>
//!   <label xml:lang="en">Scans</label>
//!   <node name="a" type="dir">
//!     <node name="b.txt" type="file" md5="d41d8cd98f00b204e9800998ecf8427e"/>
//!   </node>
//! </collection>
//! ```

use crate::error::{Result, StoreError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::fmt;

pub const SIDECAR_FILE_NAME: &str = "mcrdata.xml";

const ROOT_ELEMENT: &str = "collection";
const NODE_ELEMENT: &str = "node";
const LABEL_ELEMENT: &str = "label";
const LANG_ATTRIBUTE: &str = "xml:lang";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

impl NodeKind {
    fn as_attribute(&self) -> &'static str {
        match self {
            NodeKind::Directory => "dir",
            NodeKind::File => "file",
        }
    }

    fn from_attribute(value: &str) -> Option<Self> {
        match value {
            "dir" | "directory" => Some(NodeKind::Directory),
            "file" => Some(NodeKind::File),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_attribute())
    }
}

/// Sidecar record of one node; directories nest their children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarEntry {
    pub kind: NodeKind,
    pub md5: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub children: BTreeMap<String, SidecarEntry>,
}

impl SidecarEntry {
    pub fn directory() -> Self {
        Self {
            kind: NodeKind::Directory,
            md5: None,
            labels: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn file(md5: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::File,
            md5: Some(md5.into()),
            labels: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    root: SidecarEntry,
}

impl Default for Sidecar {
    fn default() -> Self {
        Self {
            root: SidecarEntry::directory(),
        }
    }
}

impl Sidecar {
    pub fn root(&self) -> &SidecarEntry {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut SidecarEntry {
        &mut self.root
    }

    /// Entry at `path` (names from the collection root); the empty path is the root.
    pub fn entry(&self, path: &[String]) -> Option<&SidecarEntry> {
        path.iter()
            .try_fold(&self.root, |entry, name| entry.children.get(name))
    }

    pub fn entry_mut(&mut self, path: &[String]) -> Option<&mut SidecarEntry> {
        path.iter()
            .try_fold(&mut self.root, |entry, name| entry.children.get_mut(name))
    }

    /// Inserts `entry` at `path`, replacing what was there. The parent must exist.
    pub fn insert(&mut self, path: &[String], entry: SidecarEntry) -> Result<()> {
        let (name, parent) = path
            .split_last()
            .ok_or_else(|| StoreError::usage("The collection root has no sidecar slot"))?;
        let parent = self.entry_mut(parent).ok_or_else(|| {
            StoreError::usage(format!("Parent of /{} is not registered", path.join("/")))
        })?;
        parent.children.insert(name.clone(), entry);
        Ok(())
    }

    /// Detaches the entry at `path` and returns it.
    pub fn remove(&mut self, path: &[String]) -> Option<SidecarEntry> {
        let (name, parent) = path.split_last()?;
        self.entry_mut(parent)?.children.remove(name)
    }

    pub fn clear(&mut self) {
        self.root = SidecarEntry::directory();
    }

    pub fn parse(content: &[u8]) -> Result<Self> {
        // Label text is kept verbatim; whitespace between elements is only
        // ever seen outside an open label and dropped there
        let mut reader = Reader::from_reader(content);

        // (name, entry) of every open element; the root has no name
        let mut stack: Vec<(String, SidecarEntry)> = Vec::new();
        let mut label: Option<(String, String)> = None;
        let mut root: Option<SidecarEntry> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                StoreError::format(format!(
                    "Malformed sidecar at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            })?;

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match e.name().as_ref() {
                        b"collection" if stack.is_empty() && root.is_none() => {
                            if is_empty {
                                root = Some(SidecarEntry::directory());
                            } else {
                                stack.push((String::new(), SidecarEntry::directory()));
                            }
                        }
                        b"node" if !stack.is_empty() => {
                            let (name, entry) = parse_node(e)?;
                            if is_empty {
                                attach(&mut stack, name, entry);
                            } else {
                                stack.push((name, entry));
                            }
                        }
                        b"label" if !stack.is_empty() => {
                            let lang = attribute(e, LANG_ATTRIBUTE)?.unwrap_or_default();
                            if is_empty {
                                if let Some((_, entry)) = stack.last_mut() {
                                    entry.labels.insert(lang, String::new());
                                }
                            } else {
                                label = Some((lang, String::new()));
                            }
                        }
                        other => {
                            return Err(StoreError::format(format!(
                                "Unexpected sidecar element <{}>",
                                String::from_utf8_lossy(other)
                            )));
                        }
                    }
                }
                Event::Text(text) => {
                    if let Some((_, value)) = label.as_mut() {
                        let text = text.unescape().map_err(|e| {
                            StoreError::format(format!("Invalid label text: {}", e))
                        })?;
                        value.push_str(&text);
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"label" => {
                        if let (Some((lang, value)), Some((_, entry))) =
                            (label.take(), stack.last_mut())
                        {
                            entry.labels.insert(lang, value);
                        }
                    }
                    b"node" => {
                        if let Some((name, entry)) = stack.pop() {
                            attach(&mut stack, name, entry);
                        }
                    }
                    b"collection" => {
                        root = stack.pop().map(|(_, entry)| entry);
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        root.map(|root| Self { root })
            .ok_or_else(|| StoreError::format("Sidecar has no <collection> root element"))
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        if self.root.labels.is_empty() && self.root.children.is_empty() {
            write(&mut writer, Event::Empty(BytesStart::new(ROOT_ELEMENT)))?;
        } else {
            write(&mut writer, Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
            write_contents(&mut writer, &self.root)?;
            write(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;
        }

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn attach(stack: &mut [(String, SidecarEntry)], name: String, entry: SidecarEntry) {
    if let Some((_, parent)) = stack.last_mut() {
        parent.children.insert(name, entry);
    }
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| StoreError::format(format!("Invalid sidecar attribute: {}", e)))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| StoreError::format(format!("Invalid sidecar attribute: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_node(element: &BytesStart<'_>) -> Result<(String, SidecarEntry)> {
    let name = attribute(element, "name")?
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StoreError::format("Sidecar node without a name"))?;
    let md5 = attribute(element, "md5")?;
    // Entries written without a type are files if they carry a checksum
    let kind = match attribute(element, "type")? {
        Some(value) => NodeKind::from_attribute(&value).ok_or_else(|| {
            StoreError::format(format!("Unknown sidecar node type '{}'", value))
        })?,
        None if md5.is_some() => NodeKind::File,
        None => NodeKind::Directory,
    };

    let mut entry = match kind {
        NodeKind::Directory => SidecarEntry::directory(),
        NodeKind::File => SidecarEntry::file(String::new()),
    };
    entry.md5 = md5;
    Ok((name, entry))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| StoreError::format(format!("Failed to serialise sidecar: {}", e)))
}

fn write_contents(writer: &mut Writer<Vec<u8>>, entry: &SidecarEntry) -> Result<()> {
    for (lang, text) in &entry.labels {
        let mut start = BytesStart::new(LABEL_ELEMENT);
        start.push_attribute((LANG_ATTRIBUTE, lang.as_str()));
        write(writer, Event::Start(start))?;
        write(writer, Event::Text(BytesText::new(text)))?;
        write(writer, Event::End(BytesEnd::new(LABEL_ELEMENT)))?;
    }

    for (name, child) in &entry.children {
        let mut start = BytesStart::new(NODE_ELEMENT);
        start.push_attribute(("name", name.as_str()));
        start.push_attribute(("type", child.kind.as_attribute()));
        if let Some(md5) = &child.md5 {
            start.push_attribute(("md5", md5.as_str()));
        }

        if child.labels.is_empty() && child.children.is_empty() {
            write(writer, Event::Empty(start))?;
        } else {
            write(writer, Event::Start(start))?;
            write_contents(writer, child)?;
            write(writer, Event::End(BytesEnd::new(NODE_ELEMENT)))?;
        }
    }
    Ok(())
}
