//! # Esquema do Modelo — Estados e Features Declarados
//!
//! Antes de treinar ou decodificar, o HMM precisa saber:
//!
//! - **Estados ocultos**: o conjunto finito de categorias (ex: `drawing`, `text`),
//!   **em uma ordem fixa**. Essa ordem é a ordem de iteração do Viterbi e,
//!   portanto, define o desempate entre caminhos de mesmo score.
//! - **Features**: o nome de cada atributo observado e o seu tipo:
//!   - `Discrete { num_vals }` → valor inteiro em `[0, num_vals)`
//!   - `Continuous` → valor real, modelado por uma Gaussiana
//!
//! O esquema é validado **uma única vez**, na construção. Depois disso o resto
//! do crate trabalha com índices tipados ([`StateId`], [`FeatureId`]) em vez de
//! strings, e as tabelas de probabilidade são simples `Vec`s indexados.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{HmmError, Result};

/// Índice de um estado na ordem declarada do esquema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub usize);

/// Índice de uma feature na ordem declarada do esquema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(pub usize);

/// Tipo de uma feature, fixo na construção do esquema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Feature categórica com `num_vals` valores possíveis (`0..num_vals`).
    Discrete { num_vals: usize },
    /// Feature real, modelada por `(média, desvio padrão)`.
    Continuous,
}

/// Declaração de uma feature: nome + tipo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FeatureKind,
}

impl FeatureSpec {
    pub fn discrete(name: impl Into<String>, num_vals: usize) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Discrete { num_vals },
        }
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Continuous,
        }
    }
}

/// Conjunto validado de estados e features de um HMM.
///
/// A desserialização passa pela mesma validação de [`ModelSchema::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDef")]
pub struct ModelSchema {
    states: Vec<String>,
    features: Vec<FeatureSpec>,
    #[serde(skip)]
    state_index: HashMap<String, StateId>,
    #[serde(skip)]
    feature_index: HashMap<String, FeatureId>,
}

/// Forma "crua" do esquema, usada apenas para desserializar.
#[derive(Deserialize)]
struct SchemaDef {
    states: Vec<String>,
    #[serde(default)]
    features: Vec<FeatureSpec>,
}

impl TryFrom<SchemaDef> for ModelSchema {
    type Error = HmmError;

    fn try_from(def: SchemaDef) -> Result<Self> {
        ModelSchema::new(def.states, def.features)
    }
}

impl ModelSchema {
    /// Cria e valida um esquema.
    ///
    /// # Erros
    /// [`HmmError::InvalidSchema`] se:
    /// - não há nenhum estado;
    /// - um nome de estado ou de feature aparece duas vezes;
    /// - uma feature discreta declara `num_vals == 0`.
    pub fn new<S: Into<String>>(states: Vec<S>, features: Vec<FeatureSpec>) -> Result<Self> {
        let states: Vec<String> = states.into_iter().map(Into::into).collect();
        if states.is_empty() {
            return Err(HmmError::InvalidSchema(
                "é preciso declarar ao menos um estado".into(),
            ));
        }

        let mut state_index = HashMap::with_capacity(states.len());
        for (i, name) in states.iter().enumerate() {
            if state_index.insert(name.clone(), StateId(i)).is_some() {
                return Err(HmmError::InvalidSchema(format!("estado duplicado '{name}'")));
            }
        }

        let mut feature_index = HashMap::with_capacity(features.len());
        for (i, spec) in features.iter().enumerate() {
            if let FeatureKind::Discrete { num_vals: 0 } = spec.kind {
                return Err(HmmError::InvalidSchema(format!(
                    "feature discreta '{}' sem valores (num_vals = 0)",
                    spec.name
                )));
            }
            if feature_index.insert(spec.name.clone(), FeatureId(i)).is_some() {
                return Err(HmmError::InvalidSchema(format!(
                    "feature duplicada '{}'",
                    spec.name
                )));
            }
        }

        Ok(Self {
            states,
            features,
            state_index,
            feature_index,
        })
    }

    /// Nomes dos estados, na ordem declarada.
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// Declarações das features, na ordem declarada.
    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Todos os estados em ordem declarada (ordem de iteração do Viterbi).
    pub fn state_ids(&self) -> impl Iterator<Item = StateId> {
        (0..self.states.len()).map(StateId)
    }

    pub fn state_id(&self, name: &str) -> Result<StateId> {
        self.state_index
            .get(name)
            .copied()
            .ok_or_else(|| HmmError::UnknownStateLabel(name.to_string()))
    }

    pub fn state_name(&self, id: StateId) -> &str {
        &self.states[id.0]
    }

    pub fn feature_id(&self, name: &str) -> Result<FeatureId> {
        self.feature_index
            .get(name)
            .copied()
            .ok_or_else(|| HmmError::UnknownFeature(name.to_string()))
    }

    pub fn feature(&self, id: FeatureId) -> &FeatureSpec {
        &self.features[id.0]
    }

    /// Converte uma sequência de rótulos textuais em [`StateId`]s.
    ///
    /// Falha com [`HmmError::UnknownStateLabel`] no primeiro rótulo desconhecido.
    pub fn encode_labels<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<StateId>> {
        labels.iter().map(|l| self.state_id(l.as_ref())).collect()
    }

    /// Converte um caminho de [`StateId`]s de volta para nomes.
    pub fn decode_labels(&self, path: &[StateId]) -> Vec<String> {
        path.iter().map(|&s| self.state_name(s).to_string()).collect()
    }
}
