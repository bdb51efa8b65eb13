use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::errors::{DroidLensError, DroidLensResult};
use crate::executor::coordinator::{self, DeviceHandle};
use crate::executor::input::ExecResult;
use crate::perception::bounds::Bounds;
use crate::perception::xml_tree::{NodeId, XmlNode, XmlTree};

/// Handle on one node of a parsed hierarchy, kept for diagnostics.
#[derive(Clone)]
pub struct RawNode {
    tree: Arc<XmlTree>,
    id: NodeId,
}

impl RawNode {
    pub(crate) fn new(tree: Arc<XmlTree>, id: NodeId) -> Self {
        Self { tree, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    fn node(&self) -> &XmlNode {
        self.tree.node(self.id)
    }

    pub fn name(&self) -> &str {
        self.node().name()
    }

    pub fn attributes(&self) -> &[(String, String)] {
        self.node().attributes()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.node().attribute(key)
    }

    pub fn parent(&self) -> Option<RawNode> {
        self.node()
            .parent()
            .filter(|p| *p != NodeId::DOCUMENT)
            .map(|p| RawNode::new(self.tree.clone(), p))
    }

    pub fn children(&self) -> Vec<RawNode> {
        self.node()
            .children()
            .iter()
            .map(|c| RawNode::new(self.tree.clone(), *c))
            .collect()
    }
}

/// Renders the element's start tag, e.g. `<node index="0" text="OK" ... />`.
impl fmt::Display for RawNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name())?;
        for (key, value) in self.attributes() {
            let escaped = value
                .replace('&', "&amp;")
                .replace('"', "&quot;")
                .replace('<', "&lt;");
            write!(f, " {key}=\"{escaped}\"")?;
        }
        f.write_str(" />")
    }
}

impl fmt::Debug for RawNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawNode#{}({})", self.id.index(), self)
    }
}

// ── Attribute keys as written by uiautomator ────────────────────────────────

const INDEX: &str = "index";
const TEXT: &str = "text";
const RESOURCE_ID: &str = "resource-id";
const CLASS: &str = "class";
const PACKAGE: &str = "package";
const CONTENT_DESC: &str = "content-desc";
const CHECKABLE: &str = "checkable";
const CHECKED: &str = "checked";
const CLICKABLE: &str = "clickable";
const ENABLED: &str = "enabled";
const FOCUSABLE: &str = "focusable";
const FOCUSED: &str = "focused";
const SCROLLABLE: &str = "scrollable";
const LONG_CLICKABLE: &str = "long-clickable";
const PASSWORD: &str = "password";
const SELECTED: &str = "selected";
const BOUNDS: &str = "bounds";

/// Typed view of one `<node>` in a hierarchy dump.
///
/// Built fresh for every query result; two queries matching the same node
/// yield two independent values.
#[derive(Debug, Clone, Serialize)]
pub struct AppElement {
    #[serde(skip)]
    raw: RawNode,
    index: String,
    text: String,
    resource_id: String,
    class_name: String,
    package_name: String,
    content_desc: String,
    checkable: bool,
    checked: bool,
    clickable: bool,
    enabled: bool,
    focusable: bool,
    focused: bool,
    scrollable: bool,
    long_clickable: bool,
    password: bool,
    selected: bool,
    bounds: Bounds,
    #[serde(skip)]
    device: Option<DeviceHandle>,
}

impl AppElement {
    /// Decodes a node by attribute name. Attribute order is irrelevant and
    /// unknown attributes are ignored.
    pub fn decode(raw: RawNode, device: Option<DeviceHandle>) -> DroidLensResult<Self> {
        let string = |key: &str| -> DroidLensResult<String> {
            raw.attribute(key).map(str::to_string).ok_or_else(|| {
                DroidLensError::MalformedElement(format!("missing attribute {key:?} on {raw}"))
            })
        };
        let flag = |key: &str| -> DroidLensResult<bool> {
            match raw.attribute(key) {
                Some("true") => Ok(true),
                Some("false") => Ok(false),
                Some(other) => Err(DroidLensError::MalformedElement(format!(
                    "attribute {key:?} must be \"true\" or \"false\", got {other:?} on {raw}"
                ))),
                None => Err(DroidLensError::MalformedElement(format!(
                    "missing attribute {key:?} on {raw}"
                ))),
            }
        };

        let bounds: Bounds = string(BOUNDS)?.parse()?;

        Ok(Self {
            index: string(INDEX)?,
            text: string(TEXT)?,
            resource_id: string(RESOURCE_ID)?,
            class_name: string(CLASS)?,
            package_name: string(PACKAGE)?,
            content_desc: string(CONTENT_DESC)?,
            checkable: flag(CHECKABLE)?,
            checked: flag(CHECKED)?,
            clickable: flag(CLICKABLE)?,
            enabled: flag(ENABLED)?,
            focusable: flag(FOCUSABLE)?,
            focused: flag(FOCUSED)?,
            scrollable: flag(SCROLLABLE)?,
            long_clickable: flag(LONG_CLICKABLE)?,
            password: flag(PASSWORD)?,
            selected: flag(SELECTED)?,
            bounds,
            raw,
            device,
        })
    }

    /// Taps the centre of this element through the hierarchy's input
    /// dispatcher. The element is assumed to be on screen already; nothing
    /// is scrolled into view.
    pub async fn tap(&self) -> DroidLensResult<ExecResult> {
        let device = self.device.as_ref().ok_or(DroidLensError::Detached)?;
        coordinator::tap(self, device.input(), device.tap_config()).await
    }

    pub fn raw_element(&self) -> &RawNode {
        &self.raw
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn content_desc(&self) -> &str {
        &self.content_desc
    }

    pub fn checkable(&self) -> bool {
        self.checkable
    }

    pub fn checked(&self) -> bool {
        self.checked
    }

    pub fn clickable(&self) -> bool {
        self.clickable
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn focusable(&self) -> bool {
        self.focusable
    }

    pub fn focused(&self) -> bool {
        self.focused
    }

    pub fn scrollable(&self) -> bool {
        self.scrollable
    }

    pub fn long_clickable(&self) -> bool {
        self.long_clickable
    }

    pub fn password(&self) -> bool {
        self.password
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::geometry::Vector2;

    fn decode_first(xml: &str) -> DroidLensResult<AppElement> {
        let tree = Arc::new(XmlTree::parse(xml).unwrap());
        let root = tree.root_element();
        let first = tree.node(root).children()[0];
        AppElement::decode(RawNode::new(tree, first), None)
    }

    const OK_BUTTON: &str = r#"<hierarchy><node index="2" text="OK" resource-id="android:id/button1" class="android.widget.Button" package="com.android.settings" content-desc="" checkable="false" checked="true" clickable="true" enabled="true" focusable="true" focused="false" scrollable="false" long-clickable="false" password="false" selected="false" bounds="[10,20][30,60]"/></hierarchy>"#;

    #[test]
    fn test_decode_all_fields() {
        let el = decode_first(OK_BUTTON).unwrap();
        assert_eq!(el.index(), "2");
        assert_eq!(el.text(), "OK");
        assert_eq!(el.resource_id(), "android:id/button1");
        assert_eq!(el.class_name(), "android.widget.Button");
        assert_eq!(el.package_name(), "com.android.settings");
        assert_eq!(el.content_desc(), "");
        assert!(!el.checkable());
        assert!(el.checked());
        assert!(el.clickable());
        assert!(el.enabled());
        assert!(el.focusable());
        assert!(!el.focused());
        assert!(!el.scrollable());
        assert!(!el.long_clickable());
        assert!(!el.password());
        assert!(!el.selected());
        assert_eq!(el.bounds().center(), Vector2::new(20.0, 40.0));
        assert_eq!(el.raw_element().name(), "node");
    }

    #[test]
    fn test_decode_ignores_attribute_order_and_extras() {
        let xml = r#"<hierarchy><node bounds="[0,0][10,10]" NAF="true" selected="true" password="false" long-clickable="false" scrollable="true" focused="false" focusable="false" enabled="true" clickable="false" checked="false" checkable="false" content-desc="list" package="p" class="android.widget.ListView" resource-id="" text="" index="0" drawing-order="1"/></hierarchy>"#;
        let el = decode_first(xml).unwrap();
        assert!(el.scrollable());
        assert!(el.selected());
        assert_eq!(el.content_desc(), "list");
        assert_eq!(el.class_name(), "android.widget.ListView");
    }

    #[test]
    fn test_missing_attribute_is_malformed() {
        let xml = OK_BUTTON.replace(r#" password="false""#, "");
        let err = decode_first(&xml).unwrap_err();
        assert!(matches!(err, DroidLensError::MalformedElement(ref m) if m.contains("password")));
    }

    #[test]
    fn test_non_boolean_flag_is_malformed() {
        let xml = OK_BUTTON.replace(r#"enabled="true""#, r#"enabled="yes""#);
        assert!(matches!(decode_first(&xml), Err(DroidLensError::MalformedElement(_))));
    }

    #[test]
    fn test_false_text_decodes_to_false() {
        let el = decode_first(OK_BUTTON).unwrap();
        // The literal text "false" must not read as truthy.
        assert!(!el.focused());
        let json = serde_json::to_value(&el).unwrap();
        assert_eq!(json["focused"], serde_json::Value::Bool(false));
        assert_eq!(json["clickable"], serde_json::Value::Bool(true));
    }

    #[test]
    fn test_bad_bounds_is_malformed_bounds() {
        let xml = OK_BUTTON.replace("[10,20][30,60]", "[10,20]");
        assert!(matches!(decode_first(&xml), Err(DroidLensError::MalformedBounds(_))));
    }

    #[tokio::test]
    async fn test_tap_without_device_is_detached() {
        let el = decode_first(OK_BUTTON).unwrap();
        assert!(matches!(el.tap().await, Err(DroidLensError::Detached)));
    }

    #[test]
    fn test_raw_node_display() {
        let tree = Arc::new(XmlTree::parse(r#"<a><node text="x &quot;y&quot;"/></a>"#).unwrap());
        let id = tree.node(tree.root_element()).children()[0];
        let raw = RawNode::new(tree, id);
        assert_eq!(raw.to_string(), r#"<node text="x &quot;y&quot;" />"#);
        assert_eq!(raw.parent().map(|p| p.name().to_string()), Some("a".to_string()));
        assert!(raw.children().is_empty());
    }
}
