//! # Corpus de Demonstração e Exemplos Fixos
//!
//! - **Esquema de traços**: a configuração usada para rotular esboços de
//!   circuitos lógicos em `drawing` (fios, portas) e `text` (rótulos escritos).
//!   As cinco features são medidas geométricas já **discretizadas** em duas
//!   faixas (0 = abaixo do limiar, 1 = acima) por quem chama este crate.
//! - **Esboços anotados**: um pequeno corpus sintético, determinístico, nesse
//!   esquema. Serve para testes e para o botão "treinar demo" do servidor web.
//! - **Exemplo do clima**: o HMM clássico de 3 estados com parâmetros fixos,
//!   usado para conferir o Viterbi à mão.

use crate::model::{Emission, HmmModel};
use crate::observation::{FeatureValue, Observation};
use crate::schema::{FeatureSpec, ModelSchema};

/// Estados do rotulador de traços, na ordem de desempate.
pub const STROKE_STATES: [&str; 2] = ["drawing", "text"];

/// Features geométricas de um traço, todas binárias.
pub const STROKE_FEATURES: [&str; 5] = [
    "length",
    "ratioOfWidthHeight",
    "toSide",
    "timeDuration",
    "sumOfCurvature",
];

/// Esquema do rotulador de traços: `drawing`/`text` × 5 features binárias.
pub fn stroke_schema() -> ModelSchema {
    let features = STROKE_FEATURES
        .iter()
        .map(|name| FeatureSpec::discrete(*name, 2))
        .collect();
    // Nomes fixos e distintos: a validação não tem como falhar
    match ModelSchema::new(STROKE_STATES.to_vec(), features) {
        Ok(schema) => schema,
        Err(e) => unreachable!("esquema de traços inválido: {e}"),
    }
}

/// Um esboço anotado: sequência temporal de traços com o rótulo de cada um.
pub struct AnnotatedSketch {
    pub name: &'static str,
    /// `(rótulo, [length, ratioOfWidthHeight, toSide, timeDuration, sumOfCurvature])`
    pub strokes: &'static [(&'static str, [i64; 5])],
}

impl AnnotatedSketch {
    pub fn observations(&self) -> Vec<Observation> {
        self.strokes
            .iter()
            .map(|(_, values)| {
                STROKE_FEATURES
                    .iter()
                    .zip(values)
                    .map(|(name, &v)| (*name, FeatureValue::Discrete(v)))
                    .collect()
            })
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.strokes.iter().map(|(label, _)| label.to_string()).collect()
    }
}

// Perfis típicos: fios/portas são longos, finos, longe da borda, lentos e retos;
// letras são curtas, quadradas, perto da borda, rápidas e curvas.
const D: [i64; 5] = [1, 0, 1, 1, 0];
const T: [i64; 5] = [0, 1, 0, 0, 1];

/// Corpus sintético de esboços de circuitos.
pub fn get_sketches() -> Vec<AnnotatedSketch> {
    vec![
        AnnotatedSketch {
            name: "and-gate-labeled",
            strokes: &[
                ("drawing", D), ("drawing", D), ("drawing", [1, 0, 1, 1, 1]),
                ("text", T), ("text", T), ("text", [0, 1, 0, 1, 1]),
                ("drawing", D), ("drawing", D),
            ],
        },
        AnnotatedSketch {
            name: "or-xor-chain",
            strokes: &[
                ("drawing", D), ("drawing", [1, 1, 1, 1, 0]), ("drawing", D),
                ("drawing", D), ("text", T), ("text", T), ("drawing", D),
            ],
        },
        AnnotatedSketch {
            name: "label-first",
            strokes: &[
                ("text", T), ("text", [1, 1, 0, 0, 1]), ("text", T),
                ("drawing", D), ("drawing", D), ("drawing", [1, 0, 0, 1, 0]),
                ("text", T), ("text", T),
            ],
        },
        AnnotatedSketch {
            name: "wires-only",
            strokes: &[
                ("drawing", D), ("drawing", D), ("drawing", [1, 0, 1, 0, 0]),
                ("drawing", D), ("drawing", D),
            ],
        },
        AnnotatedSketch {
            name: "nand-not",
            strokes: &[
                ("drawing", D), ("drawing", D), ("text", T), ("text", [0, 0, 0, 0, 1]),
                ("text", T), ("text", T), ("drawing", D), ("drawing", [0, 0, 1, 1, 0]),
                ("drawing", D),
            ],
        },
    ]
}

/// Corpus sintético no formato de treino: `(observações, rótulos)` paralelos.
pub fn demo_stroke_corpus() -> (Vec<Vec<Observation>>, Vec<Vec<String>>) {
    get_sketches()
        .iter()
        .map(|sketch| (sketch.observations(), sketch.labels()))
        .unzip()
}

/// Esquema do exemplo do clima: 3 estados, uma feature com 4 valores.
pub fn weather_schema() -> ModelSchema {
    match ModelSchema::new(
        vec!["Sunny", "Cloudy", "Rainy"],
        vec![FeatureSpec::discrete("Evidence", 4)],
    ) {
        Ok(schema) => schema,
        Err(e) => unreachable!("esquema do clima inválido: {e}"),
    }
}

/// HMM do clima com parâmetros fixos (sem treino).
pub fn weather_model() -> HmmModel {
    let model = HmmModel::from_parts(
        weather_schema(),
        vec![0.63, 0.17, 0.2],
        vec![
            vec![0.5, 0.375, 0.125],
            vec![0.25, 0.125, 0.625],
            vec![0.25, 0.375, 0.375],
        ],
        vec![
            vec![Emission::Discrete { probs: vec![0.6, 0.2, 0.15, 0.05] }],
            vec![Emission::Discrete { probs: vec![0.25, 0.25, 0.25, 0.25] }],
            vec![Emission::Discrete { probs: vec![0.05, 0.10, 0.35, 0.50] }],
        ],
    );
    match model {
        Ok(model) => model,
        Err(e) => unreachable!("tabelas do clima inválidas: {e}"),
    }
}

/// Sequência de teste do clima: `Evidence = 0, 2, 3`.
pub fn weather_observations() -> Vec<Observation> {
    [0, 2, 3]
        .iter()
        .map(|&v| Observation::new().with("Evidence", v))
        .collect()
}
