//! Unit to catalog-measure matching.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::catalog::Measure;
use crate::text::normalize;

/// A resolved measure for a requested unit.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureMatch {
    pub measure: Measure,
    /// True when no measure matched and the quantity must be used as
    /// raw grams instead of multiplied by a per-unit weight.
    pub raw_grams: bool,
}

/// Unit-synonym table mapping free-text variants onto the canonical
/// token a catalog measure is usually named after.
static UNIT_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for variant in ["g", "gr", "grs", "gram", "grams", "gramo", "gramos"] {
        map.insert(variant, "g");
    }
    for variant in ["ml", "mililitro", "mililitros", "milliliter", "milliliters"] {
        map.insert(variant, "ml");
    }
    for variant in [
        "unit", "units", "unidad", "unidades", "piece", "pieces", "pieza", "piezas", "u", "ud",
        "uds",
    ] {
        map.insert(variant, "unit");
    }
    for variant in ["cup", "cups", "taza", "tazas"] {
        map.insert(variant, "cup");
    }
    for variant in ["tbsp", "tablespoon", "tablespoons", "cucharada", "cucharadas"] {
        map.insert(variant, "tablespoon");
    }
    for variant in ["tsp", "teaspoon", "teaspoons", "cucharadita", "cucharaditas"] {
        map.insert(variant, "teaspoon");
    }
    for variant in ["slice", "slices", "rebanada", "rebanadas", "loncha", "lonchas"] {
        map.insert(variant, "slice");
    }
    map
});

/// Resolves a free-text unit against a food's available measures.
///
/// Resolution order: exact case-insensitive name match, substring
/// containment, synonym table, then the default 1-gram measure with
/// the raw-grams flag set. Never fails: an unmatched unit degrades
/// instead of blocking the conversation.
pub fn resolve_measure(unit: Option<&str>, measures: &[Measure]) -> MeasureMatch {
    let Some(unit) = unit.map(normalize).filter(|u| !u.is_empty()) else {
        return fallback(measures);
    };

    if let Some(found) = match_name(&unit, measures) {
        return MeasureMatch {
            measure: found.clone(),
            raw_grams: false,
        };
    }

    if let Some(canonical) = UNIT_SYNONYMS.get(unit.as_str()) {
        if let Some(found) = match_name(canonical, measures) {
            return MeasureMatch {
                measure: found.clone(),
                raw_grams: false,
            };
        }
        // Gram variants resolve to raw grams even without a "g" measure.
        if *canonical == "g" {
            return MeasureMatch {
                measure: Measure::default_gram(),
                raw_grams: true,
            };
        }
    }

    fallback(measures)
}

fn match_name<'a>(unit: &str, measures: &'a [Measure]) -> Option<&'a Measure> {
    let exact = measures.iter().find(|m| normalize(&m.name) == unit);
    if exact.is_some() {
        return exact;
    }
    measures.iter().find(|m| {
        let name = normalize(&m.name);
        // Single-letter names (like "g") only match exactly; containment
        // against them would swallow almost any unit.
        name.contains(unit) || (name.chars().count() > 1 && unit.contains(&name))
    })
}

fn fallback(measures: &[Measure]) -> MeasureMatch {
    // Prefer an existing gram measure over the synthetic default.
    if let Some(gram) = measures.iter().find(|m| normalize(&m.name) == "g") {
        return MeasureMatch {
            measure: gram.clone(),
            raw_grams: true,
        };
    }
    MeasureMatch {
        measure: Measure::default_gram(),
        raw_grams: true,
    }
}
