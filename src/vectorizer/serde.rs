use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::vectorizer::lsi::LsiModel;
use crate::vectorizer::tfidf::{TfidfData, TfidfEngine, TfidfModel};

/// Version written into every artifact header
pub const FORMAT_VERSION: u32 = 1;

/// A value stored on disk as one CBOR blob
/// `KIND` is checked on load so a file of one kind cannot be read as another.
pub trait Artifact: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

/// 書き込み用のエンベロープ
/// 参照を持つのでシリアライズ専用
#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    kind: &'a str,
    version: u32,
    payload: &'a T,
}

/// 読み込み用のエンベロープ
#[derive(Deserialize)]
struct Envelope<T> {
    kind: String,
    version: u32,
    payload: T,
}

/// Write `value` to `path` inside a kind/version envelope
pub fn save_artifact<T: Artifact, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    let envelope = EnvelopeRef {
        kind: T::KIND,
        version: FORMAT_VERSION,
        payload: value,
    };
    serde_cbor::to_writer(&mut writer, &envelope)?;
    writer.flush()?;
    Ok(())
}

/// Read an artifact written by `save_artifact`
///
/// # Errors
/// `Io` if the file cannot be opened, `Format` on a decode failure, a
/// different kind or an unknown version.
pub fn load_artifact<T: Artifact, P: AsRef<Path>>(path: P) -> Result<T> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let envelope: Envelope<T> = serde_cbor::from_reader(reader)?;
    if envelope.kind != T::KIND {
        return Err(Error::Format(format!(
            "{} holds a {:?} artifact, expected {:?}",
            path.as_ref().display(),
            envelope.kind,
            T::KIND
        )));
    }
    if envelope.version != FORMAT_VERSION {
        return Err(Error::Format(format!(
            "{}: unsupported format version {}",
            path.as_ref().display(),
            envelope.version
        )));
    }
    Ok(envelope.payload)
}

impl Artifact for TfidfData {
    const KIND: &'static str = "tfidf";
}

impl Artifact for LsiModel {
    const KIND: &'static str = "lsi";
}

impl<E: TfidfEngine> TfidfModel<E> {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_artifact(path, &self.to_data())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data: TfidfData = load_artifact(path.as_ref())?;
        let model = data.into_model();
        info!(
            path = %path.as_ref().display(),
            terms = model.num_terms(),
            docs = model.num_docs(),
            "loaded tfidf model"
        );
        Ok(model)
    }
}

impl LsiModel {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_artifact(path, self)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let model: LsiModel = load_artifact(path.as_ref())?;
        model.check_shape()?;
        info!(
            path = %path.as_ref().display(),
            terms = model.num_terms(),
            topics = model.num_topics(),
            "loaded lsi model"
        );
        Ok(model)
    }
}
