//! # Avaliação — Tabela de Confusão e Acurácia
//!
//! Compara rótulos verdadeiros com rótulos preditos, posição a posição:
//!
//! ```text
//!                 predito
//!               drawing  text
//! real drawing     41      2
//!      text         3     17
//! ```
//!
//! `acurácia = diagonal / total`.

use serde::{Deserialize, Serialize};

use crate::error::{HmmError, Result};
use crate::model::HmmModel;
use crate::observation::Observation;
use crate::schema::ModelSchema;
use crate::viterbi::ViterbiDecoder;

/// Contagens `[real][predito]` na ordem declarada dos estados.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub states: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Tabela zerada para os estados do esquema.
    pub fn new(schema: &ModelSchema) -> Self {
        let k = schema.num_states();
        Self {
            states: schema.states().to_vec(),
            counts: vec![vec![0; k]; k],
        }
    }

    /// Monta a tabela a partir de duas sequências alinhadas de rótulos.
    pub fn from_labels<S: AsRef<str>, P: AsRef<str>>(
        schema: &ModelSchema,
        truth: &[S],
        predicted: &[P],
    ) -> Result<Self> {
        let mut matrix = Self::new(schema);
        matrix.add(schema, truth, predicted)?;
        Ok(matrix)
    }

    /// Acumula mais um par de sequências alinhadas.
    ///
    /// Todos os rótulos são validados antes de qualquer contagem.
    pub fn add<S: AsRef<str>, P: AsRef<str>>(
        &mut self,
        schema: &ModelSchema,
        truth: &[S],
        predicted: &[P],
    ) -> Result<()> {
        if truth.len() != predicted.len() {
            return Err(HmmError::DimensionMismatch(format!(
                "{} rótulos reais para {} preditos",
                truth.len(),
                predicted.len()
            )));
        }
        let truth = schema.encode_labels(truth)?;
        let predicted = schema.encode_labels(predicted)?;

        for (t, p) in truth.iter().zip(&predicted) {
            self.counts[t.0][p.0] += 1;
        }
        Ok(())
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.counts.len()).map(|i| self.counts[i][i]).sum()
    }

    /// Fração de acertos; 0.0 para uma tabela vazia.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.correct() as f64 / total as f64
    }

    /// Contagem de uma célula pelos nomes dos estados.
    pub fn count(&self, truth: &str, predicted: &str) -> Option<usize> {
        let t = self.states.iter().position(|s| s == truth)?;
        let p = self.states.iter().position(|s| s == predicted)?;
        Some(self.counts[t][p])
    }
}

/// Rotula de novo cada sequência do corpus e compara com os rótulos reais.
///
/// As sequências são decodificadas em paralelo; o primeiro erro encontrado
/// (na ordem do corpus) é devolvido.
pub fn validate<S: AsRef<str>>(
    model: &HmmModel,
    observations: &[Vec<Observation>],
    labels: &[Vec<S>],
) -> Result<ConfusionMatrix> {
    if observations.len() != labels.len() {
        return Err(HmmError::DimensionMismatch(format!(
            "{} sequências de observações para {} sequências de rótulos",
            observations.len(),
            labels.len()
        )));
    }

    let schema = model.schema();
    let predictions = ViterbiDecoder::new(model).label_batch(observations);

    let mut matrix = ConfusionMatrix::new(schema);
    for (truth, predicted) in labels.iter().zip(predictions) {
        matrix.add(schema, truth, &predicted?)?;
    }
    Ok(matrix)
}
