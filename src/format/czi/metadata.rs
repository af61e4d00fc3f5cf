//! The XML document embedded in the `ZISRAWMETADATA` segment.
//!
//! Only a handful of fields are used:
//!
//! ```text
//! ImageDocument/Metadata
//!   Information/Document/Title
//!   Information/Image/SizeS, SizeI, SizeV, SizeH, SizeR, SizeB
//!   Information/Image/Dimensions/Channels/Channel[@Name]
//!   Information/Instrument/Objectives/Objective/NominalMagnification
//!   Scaling/Items/Distance[@Id="X"|"Y"]/Value        (metres per pixel)
//!   DisplaySetting/Channels/Channel[@Name]            (fallback channel names)
//! ```
//!
//! Missing optional elements fall back to defaults; a missing
//! `ImageDocument/Metadata` element is an error.

use std::path::Path;

use roxmltree::{Document, Node};
use tracing::debug;

use super::subblock::{Axis, Dimension};
use crate::error::FormatError;
use crate::slide::Resolution;

/// Fields of the metadata document that the reader uses.
#[derive(Debug, Clone, PartialEq)]
pub struct CziMetadata {
    /// Document title, or the file stem when the document has none
    pub title: String,
    /// Physical pixel size in metres
    pub resolution: Resolution,
    /// Nominal objective magnification; 0 when unknown
    pub magnification: f64,
    /// Channel names in channel index order; may be shorter than the channel count
    pub channel_names: Vec<String>,
    /// Declared ranges of the scene identity axes
    pub scene_ranges: Vec<Dimension>,
}

/// First child element named `name`.
fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Follow a `/`-separated path of element names; `None` if any step is missing.
fn descend<'a, 'input>(node: Node<'a, 'input>, path: &str) -> Option<Node<'a, 'input>> {
    path.split('/').try_fold(node, |current, name| child(current, name))
}

fn text_of<'a>(node: Node<'a, '_>, path: &str) -> Option<&'a str> {
    descend(node, path)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn channel_names(node: Option<Node<'_, '_>>) -> Vec<String> {
    node.map(|channels| {
        channels
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "Channel")
            .map(|n| {
                n.attribute("Name")
                    .or_else(|| n.attribute("Id"))
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    })
    .unwrap_or_default()
}

impl CziMetadata {
    /// Parse the metadata document of the file at `path`.
    pub fn parse(xml: &str, path: &str) -> Result<Self, FormatError> {
        let document = Document::parse(xml).map_err(|e| FormatError::Metadata {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let root = document.root_element();
        if root.tag_name().name() != "ImageDocument" {
            return Err(FormatError::MissingMetadata {
                path: path.to_string(),
                field: "ImageDocument",
            });
        }
        let metadata = child(root, "Metadata").ok_or_else(|| FormatError::MissingMetadata {
            path: path.to_string(),
            field: "ImageDocument/Metadata",
        })?;

        let title = text_of(metadata, "Information/Document/Title")
            .map(str::to_string)
            .unwrap_or_else(|| {
                Path::new(path)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        let mut resolution = Resolution::default();
        if let Some(items) = descend(metadata, "Scaling/Items") {
            for distance in items
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "Distance")
            {
                let value = text_of(distance, "Value").and_then(|v| v.parse::<f64>().ok());
                match (distance.attribute("Id"), value) {
                    (Some("X"), Some(v)) => resolution.x = v,
                    (Some("Y"), Some(v)) => resolution.y = v,
                    _ => {}
                }
            }
        }

        let magnification = text_of(
            metadata,
            "Information/Instrument/Objectives/Objective/NominalMagnification",
        )
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0);

        let mut channel_names = channel_names(descend(
            metadata,
            "Information/Image/Dimensions/Channels",
        ));
        if channel_names.iter().all(String::is_empty) {
            channel_names = channel_names_fallback(metadata);
        }

        let image = descend(metadata, "Information/Image");
        let scene_ranges = [
            ("SizeS", Axis::Scene),
            ("SizeI", Axis::Illumination),
            ("SizeV", Axis::View),
            ("SizeH", Axis::Phase),
            ("SizeR", Axis::Rotation),
            ("SizeB", Axis::Acquisition),
        ]
        .into_iter()
        .filter_map(|(element, axis)| {
            let size = image
                .and_then(|img| text_of(img, element))
                .and_then(|v| v.parse::<i32>().ok())?;
            (size > 0).then_some(Dimension {
                axis,
                start: 0,
                size,
            })
        })
        .collect();

        let parsed = Self {
            title,
            resolution,
            magnification,
            channel_names,
            scene_ranges,
        };
        debug!(
            path,
            title = %parsed.title,
            magnification = parsed.magnification,
            channels = parsed.channel_names.len(),
            "parsed CZI metadata"
        );
        Ok(parsed)
    }

    /// Name of channel `index`, if the document gives one.
    pub fn channel_name(&self, index: usize) -> Option<&str> {
        self.channel_names
            .get(index)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

fn channel_names_fallback(metadata: Node<'_, '_>) -> Vec<String> {
    channel_names(descend(metadata, "DisplaySetting/Channels"))
}
