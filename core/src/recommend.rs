use crate::models::BodyWeight;

/// Daily protein per kilogram of body weight used when no goal is set.
pub const PROTEIN_G_PER_KG: f64 = 1.6;

/// Recommended daily protein in whole grams for the given body weight.
///
/// Never negative; a non-finite weight recommends nothing.
#[must_use]
pub fn recommended_target(weight: &BodyWeight) -> f64 {
    let kg = weight.kilograms();
    if !kg.is_finite() {
        return 0.0;
    }
    (kg * PROTEIN_G_PER_KG).round().max(0.0)
}
