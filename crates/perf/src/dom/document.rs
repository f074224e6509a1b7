//! Element lookup and mutation seam for the DOM batcher.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

/// The mutations the batcher can apply to an element.
pub trait Element {
    fn set_text_content(&mut self, text: &str);
    fn set_inner_html(&mut self, html: &str);
    fn set_class_name(&mut self, class_name: &str);
    /// Merge style properties into the element's inline style, keeping
    /// properties not mentioned.
    fn merge_style(&mut self, properties: &BTreeMap<String, String>);
}

/// Resolves elements by id.
pub trait Document: Send + 'static {
    /// Run `apply` on the element with `id`. Returns `false` if there is none.
    fn with_element(&mut self, id: &str, apply: &mut dyn FnMut(&mut dyn Element)) -> bool;
}

/// State of one element in a [`VirtualDocument`].
///
/// Setting text or markup also derives the other side. The derivation is
/// approximate: text escapes only `&`, `<` and `>`, and markup drops anything
/// between `<` and `>` without decoding entities or parsing quoted attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualElement {
    pub text_content: String,
    pub inner_html: String,
    pub class_name: String,
    pub style: BTreeMap<String, String>,
}

impl Element for VirtualElement {
    fn set_text_content(&mut self, text: &str) {
        self.text_content = text.to_string();
        self.inner_html = html_escape(text);
    }

    fn set_inner_html(&mut self, html: &str) {
        self.inner_html = html.to_string();
        self.text_content = strip_tags(html);
    }

    fn set_class_name(&mut self, class_name: &str) {
        self.class_name = class_name.to_string();
    }

    fn merge_style(&mut self, properties: &BTreeMap<String, String>) {
        for (name, value) in properties {
            self.style.insert(name.clone(), value.clone());
        }
    }
}

/// In-memory document for headless rendering and tests.
///
/// Clones share the same elements, so one clone can be handed to the batcher
/// while another is used to read the result.
#[derive(Debug, Clone, Default)]
pub struct VirtualDocument {
    elements: Arc<Mutex<HashMap<String, VirtualElement>>>,
}

impl VirtualDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document containing empty elements with the given ids.
    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let document = Self::new();
        for id in ids {
            document.insert(id, VirtualElement::default());
        }
        document
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VirtualElement>> {
        self.elements.lock().unwrap_or_else(|poisoned| {
            warn!("Virtual document mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn insert(&self, id: impl Into<String>, element: VirtualElement) {
        self.lock().insert(id.into(), element);
    }

    pub fn remove(&self, id: &str) -> Option<VirtualElement> {
        self.lock().remove(id)
    }

    /// Copy of the element with `id`.
    pub fn element(&self, id: &str) -> Option<VirtualElement> {
        self.lock().get(id).cloned()
    }
}

impl Document for VirtualDocument {
    fn with_element(&mut self, id: &str, apply: &mut dyn FnMut(&mut dyn Element)) -> bool {
        match self.lock().get_mut(id) {
            Some(element) => {
                apply(element);
                true
            }
            None => false,
        }
    }
}

fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}
