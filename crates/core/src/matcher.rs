//! Resolves targeting queries against detected elements.

use crate::cache::ElementCache;
use crate::element::Element;
use crate::error::{AppError, Result};
use crate::mode::DetectionMode;
use tracing::debug;

/// What a caller wants to tap. Exactly one key per query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetQuery {
    Index(usize),
    /// Case-insensitive, against text or content description.
    Text { text: String, exact: bool },
    /// Substring of the resource id unless `partial` is off.
    ResourceId { id: String, partial: bool },
}

impl TargetQuery {
    /// Builds a query from optional keys, rejecting zero or several.
    pub fn from_keys(
        index: Option<usize>,
        text: Option<String>,
        resource_id: Option<String>,
        exact: bool,
        partial: bool,
    ) -> Result<Self> {
        match (index, text, resource_id) {
            (Some(index), None, None) => Ok(Self::Index(index)),
            (None, Some(text), None) => Ok(Self::Text { text, exact }),
            (None, None, Some(id)) => Ok(Self::ResourceId { id, partial }),
            (None, None, None) => Err(AppError::invalid_query(
                "Must provide one of: index, text, or resource_id",
            )),
            _ => Err(AppError::invalid_query(
                "Provide only one of: index, text, or resource_id",
            )),
        }
    }

    /// First matching element in index order.
    pub fn find<'a>(&self, elements: &'a [Element]) -> Option<&'a Element> {
        match self {
            Self::Index(index) => find_by_index(elements, *index),
            Self::Text { text, exact } => find_by_text(elements, text, *exact),
            Self::ResourceId { id, partial } => find_by_resource_id(elements, id, *partial),
        }
    }

    /// Short description for responses, e.g. `text='OK'`.
    pub fn describe(&self) -> String {
        match self {
            Self::Index(index) => format!("index={index}"),
            Self::Text { text, .. } => format!("text='{text}'"),
            Self::ResourceId { id, .. } => format!("resource_id='{id}'"),
        }
    }
}

pub fn find_by_index(elements: &[Element], index: usize) -> Option<&Element> {
    elements.iter().find(|e| e.index == index)
}

pub fn find_by_text<'a>(elements: &'a [Element], text: &str, exact: bool) -> Option<&'a Element> {
    let needle = text.to_lowercase();
    elements.iter().find(|e| {
        let text = e.text.to_lowercase();
        let desc = e.content_desc.to_lowercase();
        if exact {
            text == needle || desc == needle
        } else {
            text.contains(&needle) || desc.contains(&needle)
        }
    })
}

pub fn find_by_resource_id<'a>(elements: &'a [Element], id: &str, partial: bool) -> Option<&'a Element> {
    elements.iter().find(|e| {
        if partial {
            e.resource_id.contains(id)
        } else {
            e.resource_id == id
        }
    })
}

/// Result of resolving a query.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetOutcome {
    Found { element: Element, x: i32, y: i32 },
    /// Nothing matched even after one refresh.
    NotFound { available: usize },
}

/// Resolves `query` against the cached elements for `device`.
///
/// `mode` and `clickable_only` should be the ones the caller listed elements
/// with, otherwise the indices it saw may not be the cached ones. A miss
/// triggers one forced refresh and a retry, unless the request was already
/// served from a forced refresh.
pub fn resolve(
    cache: &ElementCache,
    device: Option<&str>,
    mode: DetectionMode,
    clickable_only: bool,
    query: &TargetQuery,
    force_refresh: bool,
) -> Result<TargetOutcome> {
    let snapshot = cache.get(device, mode, clickable_only, force_refresh)?;
    if let Some(found) = found(query, &snapshot.elements) {
        return Ok(found);
    }
    if force_refresh {
        return Ok(TargetOutcome::NotFound {
            available: snapshot.elements.len(),
        });
    }

    debug!(query = %query.describe(), "no match in cached elements, refreshing once");
    let snapshot = cache.get(device, mode, clickable_only, true)?;
    Ok(found(query, &snapshot.elements).unwrap_or(TargetOutcome::NotFound {
        available: snapshot.elements.len(),
    }))
}

fn found(query: &TargetQuery, elements: &[Element]) -> Option<TargetOutcome> {
    query.find(elements).map(|element| {
        let center = element.center();
        TargetOutcome::Found {
            element: element.clone(),
            x: center.x,
            y: center.y,
        }
    })
}
