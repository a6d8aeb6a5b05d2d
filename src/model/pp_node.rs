//! Pharmacophore node: one point of the Flexophore graph.
//!
//! A node is a multiset of interaction-type labels. Labels are collected with
//! [`PPNode::add`] and put into canonical (ascending) order by
//! [`PPNode::realize`]. Equality and ordering always look at the sorted
//! labels, so an unrealized node compares the same as its realized form.
//!
//! Packed form (used by [`super::MolDistHist`] and the codec):
//!
//! ```text
//! [ count: u8 ][ label 0: u16 LE ][ label 1: u16 LE ] ...
//! ```

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{MAX_INTERACTION_TYPE, MAX_LABELS_PER_NODE};
use crate::{Error, Result};

/// Bytes per packed label.
pub const LABEL_BYTES: usize = 2;

/// A pharmacophore point: sorted multiset of interaction types.
///
/// Serialized as its sorted label list; deserialization validates labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u16>", into = "Vec<u16>")]
pub struct PPNode {
    labels: SmallVec<[u16; 4]>,
    realized: bool,
}

impl PPNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and realize a node in one step.
    pub fn with_labels(labels: impl IntoIterator<Item = u32>) -> Result<Self> {
        let mut node = Self::new();
        for label in labels {
            node.add(label)?;
        }
        node.realize();
        Ok(node)
    }

    /// Append an interaction type. Clears the realized flag.
    pub fn add(&mut self, label: u32) -> Result<()> {
        if label > MAX_INTERACTION_TYPE {
            return Err(Error::InteractionTypeOutOfRange(label));
        }
        if self.labels.len() >= MAX_LABELS_PER_NODE {
            return Err(Error::TooManyLabels);
        }
        self.labels.push(label as u16);
        self.realized = false;
        Ok(())
    }

    /// Sort labels ascending and trim storage. Idempotent.
    pub fn realize(&mut self) {
        if self.realized {
            return;
        }
        self.labels.sort_unstable();
        self.labels.shrink_to_fit();
        self.realized = true;
    }

    pub fn is_realized(&self) -> bool {
        self.realized
    }

    /// Replace all labels with those of `other`.
    pub fn copy_from(&mut self, other: &PPNode) {
        self.labels.clone_from(&other.labels);
        self.realized = other.realized;
    }

    /// Replace all labels. The node is realized afterwards.
    pub fn set(&mut self, labels: &[u16]) -> Result<()> {
        if labels.len() > MAX_LABELS_PER_NODE {
            return Err(Error::TooManyLabels);
        }
        if let Some(&bad) = labels.iter().find(|&&l| u32::from(l) > MAX_INTERACTION_TYPE) {
            return Err(Error::InteractionTypeOutOfRange(u32::from(bad)));
        }
        self.labels = SmallVec::from_slice(labels);
        self.realized = false;
        self.realize();
        Ok(())
    }

    /// Labels in insertion order before `realize()`, ascending afterwards.
    pub fn labels(&self) -> &[u16] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: u16) -> bool {
        self.labels.contains(&label)
    }

    pub fn max_label(&self) -> Option<u16> {
        self.labels.iter().copied().max()
    }

    fn sorted_labels(&self) -> Cow<'_, [u16]> {
        if self.realized {
            Cow::Borrowed(&self.labels)
        } else {
            let mut v = self.labels.to_vec();
            v.sort_unstable();
            Cow::Owned(v)
        }
    }

    // ========================================================================
    // Packed form
    // ========================================================================

    /// Size of the packed form in bytes.
    pub fn packed_len(&self) -> usize {
        1 + self.labels.len() * LABEL_BYTES
    }

    /// Append the packed form (sorted labels) to `buf`.
    pub fn write_packed(&self, buf: &mut Vec<u8>) {
        let labels = self.sorted_labels();
        buf.reserve(1 + labels.len() * LABEL_BYTES);
        // MAX_LABELS_PER_NODE == u8::MAX
        buf.push(labels.len() as u8);
        for &label in labels.iter() {
            buf.extend_from_slice(&label.to_le_bytes());
        }
    }

    /// Read one packed node from the start of `buf`.
    ///
    /// Returns the realized node and the number of bytes consumed.
    pub fn read_packed(buf: &[u8]) -> Result<(PPNode, usize)> {
        let (&count, rest) = buf
            .split_first()
            .ok_or_else(|| Error::Decode("empty node record".into()))?;
        let count = count as usize;
        if count == 0 {
            return Err(Error::EmptyNode);
        }
        let needed = count * LABEL_BYTES;
        if rest.len() < needed {
            return Err(Error::Decode(format!(
                "node record announces {count} labels but only {} bytes follow",
                rest.len()
            )));
        }
        let mut node = PPNode::new();
        for chunk in rest[..needed].chunks_exact(LABEL_BYTES) {
            node.add(u32::from(u16::from_le_bytes([chunk[0], chunk[1]])))?;
        }
        node.realize();
        Ok((node, 1 + needed))
    }
}

impl PartialEq for PPNode {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len() && self.sorted_labels() == other.sorted_labels()
    }
}

impl Eq for PPNode {}

impl Ord for PPNode {
    /// Max label first, then label count, then the sorted labels.
    fn cmp(&self, other: &Self) -> Ordering {
        self.max_label()
            .cmp(&other.max_label())
            .then_with(|| self.labels.len().cmp(&other.labels.len()))
            .then_with(|| self.sorted_labels().cmp(&other.sorted_labels()))
    }
}

impl PartialOrd for PPNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<Vec<u16>> for PPNode {
    type Error = Error;

    fn try_from(labels: Vec<u16>) -> Result<Self> {
        let mut node = PPNode::new();
        node.set(&labels)?;
        Ok(node)
    }
}

impl From<PPNode> for Vec<u16> {
    fn from(node: PPNode) -> Self {
        node.sorted_labels().into_owned()
    }
}

impl fmt::Display for PPNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (k, label) in self.sorted_labels().iter().enumerate() {
            if k > 0 {
                f.write_str(",")?;
            }
            write!(f, "{label}")?;
        }
        f.write_str(")")
    }
}

impl FromStr for PPNode {
    type Err = Error;

    /// Parses `(l1,l2,...)`.
    fn from_str(s: &str) -> Result<Self> {
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(|| Error::Parse {
                position: 0,
                message: format!("expected '(labels)', got '{s}'"),
            })?;
        let mut node = PPNode::new();
        for (k, part) in inner.split(',').enumerate() {
            let label: u32 = part.trim().parse().map_err(|_| Error::Parse {
                position: k,
                message: format!("invalid interaction type '{part}'"),
            })?;
            node.add(label)?;
        }
        node.realize();
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realize_sorts_and_is_idempotent() {
        let mut node = PPNode::new();
        node.add(17).unwrap();
        node.add(3).unwrap();
        node.add(9).unwrap();
        assert!(!node.is_realized());
        node.realize();
        assert_eq!(node.labels(), &[3, 9, 17]);
        node.realize();
        assert_eq!(node.labels(), &[3, 9, 17]);
    }

    #[test]
    fn label_above_maximum_is_rejected() {
        let mut node = PPNode::new();
        assert!(node.add(MAX_INTERACTION_TYPE).is_ok());
        assert!(matches!(
            node.add(MAX_INTERACTION_TYPE + 1),
            Err(Error::InteractionTypeOutOfRange(30_001))
        ));
    }

    #[test]
    fn label_count_is_capped() {
        let mut node = PPNode::new();
        for _ in 0..MAX_LABELS_PER_NODE {
            node.add(1).unwrap();
        }
        assert!(matches!(node.add(1), Err(Error::TooManyLabels)));
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a = PPNode::with_labels([4, 1, 2]).unwrap();
        let mut b = PPNode::new();
        b.add(2).unwrap();
        b.add(4).unwrap();
        b.add(1).unwrap();
        assert_eq!(a, b);

        let c = PPNode::with_labels([1, 2]).unwrap();
        assert_ne!(a, c);
        let d = PPNode::with_labels([1, 2, 2]).unwrap();
        assert_ne!(c, d);
    }

    #[test]
    fn ordering_by_max_then_count_then_labels() {
        let low_max = PPNode::with_labels([1, 2, 3]).unwrap();
        let high_max = PPNode::with_labels([7]).unwrap();
        assert!(low_max < high_max);

        let one = PPNode::with_labels([7]).unwrap();
        let two = PPNode::with_labels([1, 7]).unwrap();
        assert!(one < two);

        let a = PPNode::with_labels([1, 7]).unwrap();
        let b = PPNode::with_labels([2, 7]).unwrap();
        assert!(a < b);
        assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn packed_form_is_little_endian() {
        let node = PPNode::with_labels([0x0102, 5]).unwrap();
        let mut buf = Vec::new();
        node.write_packed(&mut buf);
        assert_eq!(buf, vec![2, 5, 0, 0x02, 0x01]);
        assert_eq!(buf.len(), node.packed_len());

        let (back, used) = PPNode::read_packed(&buf).unwrap();
        assert_eq!(used, 5);
        assert_eq!(back, node);
    }

    #[test]
    fn truncated_packed_record_fails() {
        assert!(matches!(PPNode::read_packed(&[3, 1, 0]), Err(Error::Decode(_))));
        assert!(matches!(PPNode::read_packed(&[0, 1, 0]), Err(Error::EmptyNode)));
    }

    #[test]
    fn text_form_round_trips() {
        let node = PPNode::with_labels([12, 4]).unwrap();
        assert_eq!(node.to_string(), "(4,12)");
        assert_eq!("(4,12)".parse::<PPNode>().unwrap(), node);
        assert!("4,12".parse::<PPNode>().is_err());
        assert!("(4,x)".parse::<PPNode>().is_err());
    }

    #[test]
    fn set_replaces_labels() {
        let mut node = PPNode::with_labels([1]).unwrap();
        node.set(&[9, 2]).unwrap();
        assert_eq!(node.labels(), &[2, 9]);
        assert!(node.set(&[30_001]).is_err());

        let mut copy = PPNode::new();
        copy.copy_from(&node);
        assert_eq!(copy, node);
    }

    #[test]
    fn serde_goes_through_validation() {
        let node: PPNode = serde_json::from_str("[5,1]").unwrap();
        assert!(node.is_realized());
        assert_eq!(node.labels(), &[1, 5]);
        assert_eq!(node, PPNode::with_labels([1, 5]).unwrap());
        assert_eq!(serde_json::to_string(&node).unwrap(), "[1,5]");

        assert!(serde_json::from_str::<PPNode>("[60000]").is_err());
        assert!(serde_json::from_str::<PPNode>(r#"{"labels":[5,1],"realized":true}"#).is_err());
    }
}
