//! # Observações — Vetores de Features de um Traço
//!
//! Cada posição da sequência (um traço desenhado) é descrita por um mapa
//! `nome da feature → valor`. Quem produz esses mapas (extração geométrica,
//! discretização por faixas) fica fora deste crate; aqui só validamos e
//! convertemos para índices do esquema.
//!
//! ```text
//! {"length": 1, "sumOfCurvature": 0}   →   [(FeatureId(0), 1), (FeatureId(4), 0)]
//! ```
//!
//! Uma observação pode trazer apenas um **subconjunto** das features declaradas:
//! a emissão é o produto sobre as features presentes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{HmmError, Result};
use crate::schema::{FeatureId, FeatureKind, ModelSchema};

/// Valor observado de uma feature.
///
/// Em JSON é um número simples: inteiros viram `Discrete`, reais viram `Continuous`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Discrete(i64),
    Continuous(f64),
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Discrete(v)
    }
}

impl From<i32> for FeatureValue {
    fn from(v: i32) -> Self {
        FeatureValue::Discrete(v as i64)
    }
}

impl From<usize> for FeatureValue {
    fn from(v: usize) -> Self {
        FeatureValue::Discrete(v as i64)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Continuous(v)
    }
}

/// Uma posição da sequência: mapa `feature → valor`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Observation {
    values: BTreeMap<String, FeatureValue>,
}

impl Observation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Versão "builder" de [`Observation::insert`].
    pub fn with(mut self, feature: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(feature, value);
        self
    }

    pub fn insert(&mut self, feature: impl Into<String>, value: impl Into<FeatureValue>) {
        self.values.insert(feature.into(), value.into());
    }

    pub fn get(&self, feature: &str) -> Option<FeatureValue> {
        self.values.get(feature).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, FeatureValue)> for Observation {
    fn from_iter<I: IntoIterator<Item = (S, FeatureValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Valor já validado contra o esquema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum EncodedValue {
    Discrete(usize),
    Continuous(f64),
}

/// Observação validada: pares `(FeatureId, valor)` em ordem de nome.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EncodedObservation {
    pub(crate) values: Vec<(FeatureId, EncodedValue)>,
}

/// Valida uma observação contra o esquema.
///
/// # Erros
/// - [`HmmError::UnknownFeature`]: feature não declarada.
/// - [`HmmError::InvalidDiscreteValue`]: valor fora de `[0, num_vals)`.
/// - [`HmmError::FeatureKindMismatch`]: valor real numa feature discreta.
pub(crate) fn encode_observation(
    schema: &ModelSchema,
    observation: &Observation,
) -> Result<EncodedObservation> {
    let mut values = Vec::with_capacity(observation.len());

    for (name, value) in observation.iter() {
        let id = schema.feature_id(name)?;
        let encoded = match (schema.feature(id).kind, value) {
            (FeatureKind::Discrete { num_vals }, FeatureValue::Discrete(v)) => {
                if v < 0 || v as u64 >= num_vals as u64 {
                    return Err(HmmError::InvalidDiscreteValue {
                        feature: name.to_string(),
                        value: v,
                        num_vals,
                    });
                }
                EncodedValue::Discrete(v as usize)
            }
            (FeatureKind::Discrete { .. }, FeatureValue::Continuous(_)) => {
                return Err(HmmError::FeatureKindMismatch(name.to_string()));
            }
            // Inteiros em JSON também são valores reais válidos
            (FeatureKind::Continuous, FeatureValue::Discrete(v)) => EncodedValue::Continuous(v as f64),
            (FeatureKind::Continuous, FeatureValue::Continuous(x)) => EncodedValue::Continuous(x),
        };
        values.push((id, encoded));
    }

    Ok(EncodedObservation { values })
}

/// Valida uma sequência inteira, parando no primeiro erro.
pub(crate) fn encode_sequence(
    schema: &ModelSchema,
    sequence: &[Observation],
) -> Result<Vec<EncodedObservation>> {
    sequence
        .iter()
        .map(|obs| encode_observation(schema, obs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSpec;

    fn schema() -> ModelSchema {
        ModelSchema::new(
            vec!["drawing", "text"],
            vec![
                FeatureSpec::discrete("length", 2),
                FeatureSpec::continuous("curvature"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_encode_valid_observation() {
        let obs = Observation::new().with("length", 1).with("curvature", 0.25);
        let encoded = encode_observation(&schema(), &obs).unwrap();

        // BTreeMap: "curvature" < "length"
        assert_eq!(
            encoded.values,
            vec![
                (FeatureId(1), EncodedValue::Continuous(0.25)),
                (FeatureId(0), EncodedValue::Discrete(1)),
            ]
        );
    }

    #[test]
    fn test_integer_accepted_for_continuous_feature() {
        let obs = Observation::new().with("curvature", 3);
        let encoded = encode_observation(&schema(), &obs).unwrap();
        assert_eq!(encoded.values, vec![(FeatureId(1), EncodedValue::Continuous(3.0))]);
    }

    #[test]
    fn test_encode_rejects_malformed_values() {
        let s = schema();

        let unknown = Observation::new().with("speed", 1);
        assert!(matches!(encode_observation(&s, &unknown), Err(HmmError::UnknownFeature(_))));

        let too_big = Observation::new().with("length", 2);
        assert!(matches!(
            encode_observation(&s, &too_big),
            Err(HmmError::InvalidDiscreteValue { value: 2, num_vals: 2, .. })
        ));

        let negative = Observation::new().with("length", -1);
        assert!(matches!(
            encode_observation(&s, &negative),
            Err(HmmError::InvalidDiscreteValue { value: -1, .. })
        ));

        let real = Observation::new().with("length", 0.5);
        assert!(matches!(
            encode_observation(&s, &real),
            Err(HmmError::FeatureKindMismatch(_))
        ));
    }

    #[test]
    fn test_observation_json_shape() {
        let obs: Observation = serde_json::from_str(r#"{"length": 1, "curvature": 0.5}"#).unwrap();
        assert_eq!(obs.get("length"), Some(FeatureValue::Discrete(1)));
        assert_eq!(obs.get("curvature"), Some(FeatureValue::Continuous(0.5)));
    }
}
