//! Tag mapping options for the codec

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_ITEM_TAG: &str = "item";

fn default_item_tag() -> String {
    DEFAULT_ITEM_TAG.to_string()
}

fn default_retype() -> bool {
    true
}

/// How property names map onto node tags and attributes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodecOptions {
    /// Property name -> tag for scalar and record properties
    #[serde(default)]
    pub tag_rename: BTreeMap<String, String>,

    /// Array property name -> tag shared by each of its items
    #[serde(default)]
    pub array_item_tag: BTreeMap<String, String>,

    /// Properties stored as attributes of the parent node
    #[serde(default)]
    pub attribute_props: BTreeSet<String>,

    /// Item tag for arrays without an entry in `array_item_tag`
    #[serde(default = "default_item_tag")]
    pub default_item_tag: String,

    /// Apply [`Scalar::infer`](crate::tree::Scalar::infer) to string leaves
    #[serde(default = "default_retype")]
    pub retype_strings: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            tag_rename: BTreeMap::new(),
            array_item_tag: BTreeMap::new(),
            attribute_props: BTreeSet::new(),
            default_item_tag: default_item_tag(),
            retype_strings: true,
        }
    }
}

impl CodecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, property: impl Into<String>, tag: impl Into<String>) -> Self {
        self.tag_rename.insert(property.into(), tag.into());
        self
    }

    pub fn array_items(mut self, property: impl Into<String>, tag: impl Into<String>) -> Self {
        self.array_item_tag.insert(property.into(), tag.into());
        self
    }

    pub fn attribute(mut self, property: impl Into<String>) -> Self {
        self.attribute_props.insert(property.into());
        self
    }

    pub fn with_default_item_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_item_tag = tag.into();
        self
    }

    pub fn without_retyping(mut self) -> Self {
        self.retype_strings = false;
        self
    }

    /// Tag for a scalar or record property
    pub fn tag_for(&self, property: &str) -> String {
        self.tag_rename
            .get(property)
            .cloned()
            .unwrap_or_else(|| property.to_string())
    }

    /// Tag shared by the items of an array property
    pub fn item_tag_for(&self, property: &str) -> String {
        self.array_item_tag
            .get(property)
            .cloned()
            .unwrap_or_else(|| self.default_item_tag.clone())
    }

    /// Reverse mapping: which property a child tag belongs to, and whether
    /// it is a registered array-item tag. Array tags win over renames.
    pub fn property_for(&self, tag: &str) -> (String, bool) {
        if let Some((prop, _)) = self.array_item_tag.iter().find(|(_, t)| t.as_str() == tag) {
            return (prop.clone(), true);
        }
        if let Some((prop, _)) = self.tag_rename.iter().find(|(_, t)| t.as_str() == tag) {
            return (prop.clone(), false);
        }
        (tag.to_string(), false)
    }
}
