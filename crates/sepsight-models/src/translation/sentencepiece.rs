//! Marian vocabulary built from a checkpoint's own SentencePiece model
//!
//! opus-mt checkpoints on the hub ship `source.spm` for segmentation and a
//! shared `vocab.json` that maps pieces to model ids. The ids inside the
//! `.spm` file are not the model's ids, so segmentation and id lookup are
//! kept separate.

use crate::model_loader::read_json;
use prost::Message;
use sepsight_core::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tokenizers::models::unigram::Unigram;
use tokenizers::normalizers::unicode::NFKC;
use tokenizers::pre_tokenizers::metaspace::{Metaspace, PrependScheme};
use tokenizers::Tokenizer;

/// Word-boundary marker SentencePiece puts in front of each word
const WORD_BOUNDARY: char = '\u{2581}';

const UNK_PIECE: &str = "<unk>";

/// Pieces never rendered in decoded text
const SPECIAL_PIECES: [&str; 3] = ["</s>", "<pad>", UNK_PIECE];

/// `sentencepiece.ModelProto`, reduced to the piece table
#[derive(Clone, PartialEq, Message)]
pub struct ModelProto {
    #[prost(message, repeated, tag = "1")]
    pub pieces: Vec<SentencePiece>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SentencePiece {
    #[prost(string, optional, tag = "1")]
    pub piece: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub score: Option<f32>,
    #[prost(int32, optional, tag = "3")]
    pub kind: Option<i32>,
}

impl SentencePiece {
    /// `SentencePiece.Type.UNKNOWN`
    pub const UNKNOWN: i32 = 2;
    /// `SentencePiece.Type.CONTROL`
    pub const CONTROL: i32 = 3;
}

/// Build a unigram segmenter from a serialized SentencePiece model
pub fn segmenter_from_spm(path: &Path) -> Result<Tokenizer> {
    let bytes = std::fs::read(path)?;
    let proto = ModelProto::decode(bytes.as_slice())
        .map_err(|e| Error::model_load(format!("Failed to parse {}: {}", path.display(), e)))?;

    if proto.pieces.is_empty() {
        return Err(Error::model_load(format!(
            "SentencePiece model {} has no pieces",
            path.display()
        )));
    }

    let mut unk_id = None;
    let mut vocab = Vec::with_capacity(proto.pieces.len());
    for (index, piece) in proto.pieces.into_iter().enumerate() {
        if piece.kind == Some(SentencePiece::UNKNOWN) && unk_id.is_none() {
            unk_id = Some(index);
        }
        vocab.push((piece.piece.unwrap_or_default(), f64::from(piece.score.unwrap_or(0.0))));
    }

    let unigram = Unigram::from(vocab, unk_id, false)
        .map_err(|e| Error::model_load(format!("Invalid SentencePiece model: {}", e)))?;

    let mut tokenizer = Tokenizer::new(unigram);
    tokenizer.with_normalizer(Some(NFKC));
    tokenizer.with_pre_tokenizer(Some(Metaspace::new(
        WORD_BOUNDARY,
        PrependScheme::Always,
        true,
    )));
    Ok(tokenizer)
}

/// Source segmenter plus the checkpoint's piece-to-id table
pub struct MarianVocab {
    segmenter: Tokenizer,
    piece_ids: HashMap<String, u32>,
    id_pieces: HashMap<u32, String>,
    unk_id: u32,
}

impl MarianVocab {
    /// Load `source.spm` and `vocab.json`
    pub fn load(source_spm: &Path, vocab_json: &Path) -> Result<Self> {
        let segmenter = segmenter_from_spm(source_spm)?;
        let piece_ids: HashMap<String, u32> = read_json(vocab_json)?;
        Self::new(segmenter, piece_ids)
    }

    pub fn new(segmenter: Tokenizer, piece_ids: HashMap<String, u32>) -> Result<Self> {
        let unk_id = *piece_ids
            .get(UNK_PIECE)
            .ok_or_else(|| Error::model_load(format!("Marian vocabulary has no {} entry", UNK_PIECE)))?;
        let id_pieces = piece_ids.iter().map(|(piece, id)| (*id, piece.clone())).collect();

        Ok(Self {
            segmenter,
            piece_ids,
            id_pieces,
            unk_id,
        })
    }

    /// Model ids for `text`, without the trailing end-of-sentence id
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .segmenter
            .encode(text, false)
            .map_err(|e| Error::encoding(format!("SentencePiece segmentation failed: {}", e)))?;

        Ok(encoding
            .get_tokens()
            .iter()
            .map(|piece| self.piece_ids.get(piece).copied().unwrap_or(self.unk_id))
            .collect())
    }

    /// Text for generated ids; special and unknown ids are dropped
    pub fn decode(&self, ids: &[u32]) -> String {
        let joined: String = ids
            .iter()
            .filter_map(|id| self.id_pieces.get(id))
            .filter(|piece| !SPECIAL_PIECES.contains(&piece.as_str()))
            .map(String::as_str)
            .collect();

        joined.replace(WORD_BOUNDARY, " ").trim().to_string()
    }
}
