//! Queryable snapshot of a device's view hierarchy.
use std::sync::Arc;

use crate::errors::{DroidLensError, DroidLensResult};
use crate::executor::coordinator::DeviceHandle;
use crate::perception::element::{AppElement, RawNode};
use crate::perception::traits::HierarchySource;
use crate::perception::xml_tree::XmlTree;
use crate::perception::xpath::{self, XPath};

/// One captured hierarchy: the dump text exactly as received plus its
/// parsed tree. Never mutated after construction, so clones and concurrent
/// queries need no coordination.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    xml: Arc<str>,
    tree: Arc<XmlTree>,
    device: Option<DeviceHandle>,
}

impl Hierarchy {
    /// Parses a dump. Elements found through the result cannot be tapped
    /// until a device is attached with [`Hierarchy::with_device`].
    pub fn parse(xml: impl Into<String>) -> DroidLensResult<Self> {
        let xml: String = xml.into();
        let tree = XmlTree::parse(&xml)?;
        Ok(Self {
            xml: Arc::from(xml),
            tree: Arc::new(tree),
            device: None,
        })
    }

    pub fn with_device(mut self, device: DeviceHandle) -> Self {
        self.device = Some(device);
        self
    }

    /// Pulls a fresh dump from `source` and parses it.
    pub async fn capture(
        source: &dyn HierarchySource,
        device: Option<DeviceHandle>,
    ) -> DroidLensResult<Self> {
        let xml = source
            .dump_hierarchy()
            .await
            .map_err(DroidLensError::Collaborator)?;
        tracing::info!(bytes = xml.len(), "hierarchy captured");
        let mut hierarchy = Self::parse(xml)?;
        hierarchy.device = device;
        Ok(hierarchy)
    }

    /// The dump text, verbatim.
    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn tree(&self) -> &XmlTree {
        &self.tree
    }

    pub fn device(&self) -> Option<&DeviceHandle> {
        self.device.as_ref()
    }

    /// Elements whose `index` attribute equals `index`.
    pub fn find_by_id(&self, index: &str) -> DroidLensResult<Vec<AppElement>> {
        self.find_by_query(&xpath::attribute_equals("index", index))
    }

    pub fn find_by_class(&self, class_name: &str) -> DroidLensResult<Vec<AppElement>> {
        self.find_by_query(&xpath::attribute_equals("class", class_name))
    }

    pub fn find_by_text(&self, text: &str) -> DroidLensResult<Vec<AppElement>> {
        self.find_by_query(&xpath::attribute_equals("text", text))
    }

    pub fn find_by_resource_id(&self, resource_id: &str) -> DroidLensResult<Vec<AppElement>> {
        self.find_by_query(&xpath::attribute_equals("resource-id", resource_id))
    }

    pub fn find_by_content_desc(&self, content_desc: &str) -> DroidLensResult<Vec<AppElement>> {
        self.find_by_query(&xpath::attribute_equals("content-desc", content_desc))
    }

    pub fn find_by_query(&self, expression: &str) -> DroidLensResult<Vec<AppElement>> {
        let xpath = XPath::compile(expression)?;
        self.find_by_xpath(&xpath)
    }

    /// Decodes every match in document order. One undecodable match fails
    /// the whole query.
    pub fn find_by_xpath(&self, xpath: &XPath) -> DroidLensResult<Vec<AppElement>> {
        let elements = self
            .select_nodes(xpath)?
            .into_iter()
            .map(|raw| AppElement::decode(raw, self.device.clone()))
            .collect::<DroidLensResult<Vec<_>>>()?;
        tracing::debug!(query = %xpath, matches = elements.len(), "hierarchy query");
        Ok(elements)
    }

    /// Matching nodes without decoding them.
    pub fn select_nodes(&self, xpath: &XPath) -> DroidLensResult<Vec<RawNode>> {
        Ok(xpath
            .select(&self.tree)?
            .into_iter()
            .map(|id| RawNode::new(self.tree.clone(), id))
            .collect())
    }
}
