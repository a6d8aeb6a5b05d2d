//! # Flexophore token codec
//!
//! Turns a realized [`MolDistHist`] into a compact printable token and back.
//!
//! ```text
//! token        = node-section " " histogram-section
//! node-section = b64( header | node records | zero padding to 4-byte words )
//! header       = [ FORMAT_VERSION ][ BINS_HISTOGRAM ][ BITS_BIN_VALUE ]
//! record       = [ count: u8 ][ label: u16 LE ] * count
//! hist-section = b64( histogram bit stream, pairs in row-major order )
//! ```
//!
//! `b64` is URL-safe base64 without padding, so neither section contains a
//! space. A graph with one node has an empty histogram section.
//!
//! The header pins the constants the bit widths are derived from. A token
//! written with different constants is rejected with
//! [`Error::FormatMismatch`] instead of decoding into garbage.

pub mod bits;
pub mod histogram;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::model::{MolDistHist, PPNode, BINS_HISTOGRAM};
use crate::{Error, Result};
use bits::{BitReader, BitWriter};
use histogram::{read_histogram, write_histogram, BITS_BIN_VALUE};

/// Version of the token layout.
pub const FORMAT_VERSION: u8 = 1;

/// Bytes in the node-section header.
pub const HEADER_LEN: usize = 3;

/// Node records are padded to whole words of this many bytes.
pub const WORD_BYTES: usize = 4;

const SEPARATOR: char = ' ';

fn header() -> [u8; HEADER_LEN] {
    // BINS_HISTOGRAM and BITS_BIN_VALUE both fit a byte
    [FORMAT_VERSION, BINS_HISTOGRAM as u8, BITS_BIN_VALUE as u8]
}

// ============================================================================
// Encode
// ============================================================================

/// Encode a realized graph.
pub fn encode(graph: &MolDistHist) -> Result<String> {
    if !graph.is_finalized() {
        return Err(Error::NotFinalized);
    }
    let nodes = encode_nodes(graph.node_bytes());
    let hists = encode_histograms(graph)?;
    Ok(format!("{nodes}{SEPARATOR}{hists}"))
}

fn encode_nodes(records: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(HEADER_LEN + records.len() + WORD_BYTES);
    bytes.extend_from_slice(&header());
    bytes.extend_from_slice(records);
    let padded = bytes.len().next_multiple_of(WORD_BYTES);
    bytes.resize(padded, 0);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn encode_histograms(graph: &MolDistHist) -> Result<String> {
    if graph.num_nodes() < 2 {
        return Ok(String::new());
    }
    let mut writer = BitWriter::new();
    for (i, j) in graph.pairs() {
        write_histogram(&mut writer, graph.dist_hist_slice(i, j)?);
    }
    Ok(URL_SAFE_NO_PAD.encode(writer.into_bytes()))
}

// ============================================================================
// Decode
// ============================================================================

/// Decode a token produced by [`encode`]. The result is realized.
pub fn decode(token: &str) -> Result<MolDistHist> {
    let (node_section, hist_section) = token
        .split_once(SEPARATOR)
        .ok_or_else(|| Error::Decode("missing section separator".into()))?;

    let node_bytes = URL_SAFE_NO_PAD
        .decode(node_section)
        .map_err(|e| Error::Decode(format!("node section: {e}")))?;
    let nodes = decode_nodes(&node_bytes)?;

    let mut graph = MolDistHist::with_capacity(nodes.len());
    for node in &nodes {
        graph.add_node(node)?;
    }

    let hist_bytes = URL_SAFE_NO_PAD
        .decode(hist_section)
        .map_err(|e| Error::Decode(format!("histogram section: {e}")))?;
    decode_histograms(&mut graph, &hist_bytes)?;

    graph.realize()?;
    Ok(graph)
}

fn decode_nodes(bytes: &[u8]) -> Result<Vec<PPNode>> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Decode("node section shorter than its header".into()));
    }
    let (head, records) = bytes.split_at(HEADER_LEN);
    if head != header().as_slice() {
        return Err(Error::FormatMismatch(format!(
            "token header {head:?}, this build expects {:?}",
            header()
        )));
    }
    if records.iter().all(|&b| b == 0) {
        return Err(Error::ZeroNodeVector);
    }

    let mut nodes = Vec::new();
    let mut offset = 0;
    while offset < records.len() && records[offset] != 0 {
        let (node, used) = PPNode::read_packed(&records[offset..])?;
        nodes.push(node);
        offset += used;
    }
    if records[offset..].iter().any(|&b| b != 0) {
        return Err(Error::Decode(format!("data after node terminator at byte {offset}")));
    }
    Ok(nodes)
}

fn decode_histograms(graph: &mut MolDistHist, bytes: &[u8]) -> Result<()> {
    if graph.num_nodes() < 2 {
        if !bytes.is_empty() {
            return Err(Error::Decode("single-node graph carries histogram data".into()));
        }
        return Ok(());
    }
    let mut reader = BitReader::new(bytes);
    for (i, j) in graph.pairs() {
        let hist = read_histogram(&mut reader)?;
        graph.set_dist_hist(i, j, &hist)?;
    }
    if !reader.only_padding_left() {
        return Err(Error::Decode(format!(
            "{} bits left after {} histograms",
            reader.remaining(),
            graph.num_pairs()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(labels: &[&[u32]], hists: &[(usize, usize, usize, u8)]) -> MolDistHist {
        let mut g = MolDistHist::with_capacity(labels.len());
        for l in labels {
            g.add_node(&PPNode::with_labels(l.iter().copied()).unwrap()).unwrap();
        }
        for &(i, j, bin, value) in hists {
            let mut h = g.dist_hist(i, j).unwrap();
            h[bin] = value;
            g.set_dist_hist(i, j, &h).unwrap();
        }
        g.realize().unwrap();
        g
    }

    #[test]
    fn three_node_scenario_round_trips() {
        let g = graph(
            &[&[1], &[2], &[3]],
            &[(0, 1, 17, 4), (0, 2, 17, 4), (1, 2, 17, 4)],
        );
        let token = encode(&g).unwrap();
        assert_eq!(token.matches(' ').count(), 1);
        let back = decode(&token).unwrap();
        assert_eq!(back, g);
        let labels: Vec<Vec<u16>> = back.nodes().unwrap().iter().map(|n| n.labels().to_vec()).collect();
        assert_eq!(labels, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn single_node_has_empty_histogram_section() {
        let g = graph(&[&[5, 30_000]], &[]);
        let token = encode(&g).unwrap();
        assert!(token.ends_with(' '));
        assert_eq!(decode(&token).unwrap(), g);
    }

    #[test]
    fn node_section_is_word_aligned() {
        let g = graph(&[&[1]], &[]);
        let token = encode(&g).unwrap();
        let (nodes, _) = token.split_once(' ').unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(nodes).unwrap();
        assert_eq!(bytes.len() % WORD_BYTES, 0);
        assert_eq!(&bytes[..HEADER_LEN], &header());
    }

    #[test]
    fn unrealized_graph_is_not_encoded() {
        let mut g = graph(&[&[1], &[2]], &[]);
        g.add_node(&PPNode::with_labels([3]).unwrap()).unwrap();
        assert!(matches!(encode(&g), Err(Error::NotFinalized)));
    }

    #[test]
    fn zero_node_vector_is_its_own_error() {
        let mut bytes = header().to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0, 0]);
        let token = format!("{} ", URL_SAFE_NO_PAD.encode(&bytes));
        assert!(matches!(decode(&token), Err(Error::ZeroNodeVector)));
    }

    #[test]
    fn foreign_header_is_a_format_mismatch() {
        let g = graph(&[&[1], &[2]], &[(0, 1, 3, 9)]);
        let token = encode(&g).unwrap();
        let (nodes, hists) = token.split_once(' ').unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(nodes).unwrap();
        bytes[1] = 64;
        let forged = format!("{} {hists}", URL_SAFE_NO_PAD.encode(&bytes));
        assert!(matches!(decode(&forged), Err(Error::FormatMismatch(_))));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(matches!(decode("no-separator"), Err(Error::Decode(_))));
        assert!(matches!(decode("!!! AAAA"), Err(Error::Decode(_))));
        assert!(decode(" ").is_err());

        let g = graph(&[&[1], &[2], &[3]], &[(0, 1, 0, 1)]);
        let token = encode(&g).unwrap();
        let (nodes, _) = token.split_once(' ').unwrap();
        // histograms missing for a three-node graph
        assert!(decode(&format!("{nodes} ")).is_err());
        // extra bytes after the last histogram
        let (_, hists) = token.split_once(' ').unwrap();
        let mut hist_bytes = URL_SAFE_NO_PAD.decode(hists).unwrap();
        hist_bytes.extend_from_slice(&[0xFF, 0xFF]);
        let padded = format!("{nodes} {}", URL_SAFE_NO_PAD.encode(&hist_bytes));
        assert!(decode(&padded).is_err());
    }
}
