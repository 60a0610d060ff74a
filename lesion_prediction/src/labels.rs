use crate::config::LabelsConfig;
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

pub const NO_INFORMATION: &str = "No information is available for this lesion type.";

const DEFAULT_LABELS: [(&str, &str); 7] = [
    (
        "akiec",
        "AKIEC (actinic keratoses and intraepithelial carcinoma) are keratotic skin lesions that often have the potential to turn cancerous.",
    ),
    (
        "bcc",
        "BCC (basal cell carcinoma) is the most common skin cancer and usually progresses slowly.",
    ),
    (
        "bkl",
        "BKL (benign keratosis-like lesions) are benign keratoses that carry no risk of turning cancerous.",
    ),
    (
        "df",
        "DF (dermatofibroma) is a benign tumor arising from the connective tissue of the skin.",
    ),
    (
        "mel",
        "Melanoma is the deadliest form of skin cancer and usually arises from pigment-producing cells.",
    ),
    (
        "nv",
        "NV (melanocytic nevus) is usually a benign mole, but in some cases it can turn cancerous.",
    ),
    (
        "vasc",
        "Vascular lesions arise from blood vessel structures and can be benign or malignant skin changes.",
    ),
];

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("class index {index} is outside the {count} known labels")]
    UnknownLabel { index: usize, count: usize },
    #[error("failed to load labels: {0}")]
    Load(#[from] io::Error),
    #[error("labels file contains no labels")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub label: String,
    pub info: String,
}

/// Ordered class labels plus their descriptions. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct LabelTable {
    labels: Vec<String>,
    descriptions: HashMap<String, String>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new(
            DEFAULT_LABELS
                .iter()
                .map(|(label, info)| (label.to_string(), Some(info.to_string())))
                .collect(),
        )
    }
}

impl LabelTable {
    pub fn new(entries: Vec<(String, Option<String>)>) -> Self {
        let mut labels = Vec::with_capacity(entries.len());
        let mut descriptions = HashMap::with_capacity(entries.len());
        for (label, info) in entries {
            if let Some(info) = info {
                descriptions.insert(label.clone(), info);
            }
            labels.push(label);
        }
        Self {
            labels,
            descriptions,
        }
    }

    pub fn from_config(labels_config: &LabelsConfig) -> Result<Self, LabelError> {
        match &labels_config.labels_file {
            Some(path) => {
                let table = load_labels(path)?;
                if table.is_empty() {
                    return Err(LabelError::Empty);
                }
                Ok(table)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn resolve(&self, index: usize) -> Result<LabelInfo, LabelError> {
        let label = self
            .labels
            .get(index)
            .ok_or(LabelError::UnknownLabel {
                index,
                count: self.labels.len(),
            })?;

        let info = self
            .descriptions
            .get(label)
            .map(String::as_str)
            .unwrap_or(NO_INFORMATION);

        Ok(LabelInfo {
            label: label.clone(),
            info: info.to_string(),
        })
    }
}

/// Reads one `label,description` entry per line. The description may itself
/// contain commas and may be omitted.
pub fn load_labels(filepath: &Path) -> io::Result<LabelTable> {
    let file = File::open(filepath)?;
    parse_labels(io::BufReader::new(file))
}

fn parse_labels(reader: impl BufRead) -> io::Result<LabelTable> {
    let mut entries = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (label, info) = match line.split_once(',') {
            Some((label, info)) => (label.trim(), Some(info.trim())),
            None => (line, None),
        };

        if label.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid line format: {}", line),
            ));
        }

        entries.push((
            label.to_string(),
            info.filter(|s| !s.is_empty()).map(str::to_string),
        ));
    }

    Ok(LabelTable::new(entries))
}
