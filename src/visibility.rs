use crate::field::{Field, SubmissionValues};
use crate::form::FormDefinition;

/// Whether `field` applies given the values entered so far.
///
/// A field without a condition is always shown. A conditional field is shown
/// only while its dependency holds a string equal to the required value; an
/// unknown or unset dependency hides it, and so does a field conditioned on
/// itself.
pub fn is_visible(field: &Field, values: &SubmissionValues) -> bool {
    let Some(conditional) = &field.conditional else {
        return true;
    };
    if conditional.depends_on == field.id {
        return false;
    }

    values
        .get(&conditional.depends_on)
        .and_then(|value| value.as_str())
        .is_some_and(|value| value == conditional.required_value)
}

/// The form's visible fields in order. Fields caught in a condition cycle
/// are never shown.
pub fn visible_fields<'a>(
    form: &'a FormDefinition,
    values: &'a SubmissionValues,
) -> impl Iterator<Item = &'a Field> + 'a {
    let cycles = form.conditional_cycles();
    form.fields
        .iter()
        .filter(move |field| !cycles.contains(&field.id) && is_visible(field, values))
}
