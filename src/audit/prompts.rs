/// Placeholder for the reference document in request templates.
pub const REFERENCE_SLOT: &str = "{reference_json}";
/// Placeholder for the converted briefing in request templates.
pub const BRIEFING_SLOT: &str = "{briefing_json}";

/// Exact reply meaning the two documents agree.
pub const NO_DIFF: &str = "NO_DIFF";

/// Opening user turn of every comparison conversation.
pub const RULES: &str = r#"
You audit marketing campaign data. You receive two JSON documents that should describe the same
commercial action:
- the 🟢 REFERENCE JSON, exported from the campaign platform, which is the ground truth;
- the 🟠 BRIEFING JSON, produced from a hand-written Excel briefing.

Decide whether the briefing agrees with the reference. Look ONLY at these elements:
1. `commercial_activity.start_date` and `commercial_activity.end_date`: present on both sides and in
   `YYYY-MM-DD` form.
2. `description`: the plain-text description of the action. Case and extra whitespace do not count.
3. `success_criteria`: an unordered list of metrics. Every metric must agree on `metric_name`,
   `function`, the numeric `min_amount` and `time_window`.
4. `customer_segmentation`: either `null` or an explicit segment definition. Both sides must agree.

Answer format:
- When nothing differs, reply with the single token NO_DIFF and nothing else.
- Otherwise write one bullet per problem. Start the bullet with a severity icon, then the field in
  JSON-path notation between backticks, then what was expected and what was found, for example:
  - 🔴 `commercial_activity.end_date`: expected `2025-06-30`, got `2025-06-03`
  - 🟠 `success_criteria[2].time_window`: expected `30d`, got `60d`
- 🔴 marks blocking problems (dates, missing keys). 🟠 marks warnings (description wording, extra keys).
- Keep the whole answer under 1200 tokens.
"#;

/// What a worked example is meant to teach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotOutcome {
    Identical,
    DateAndAmountMismatch,
    DescriptionAndSegmentationMismatch,
}

/// A worked example: a request template and the reply the model should give.
#[derive(Debug, Clone, Copy)]
pub struct Shot {
    pub outcome: ShotOutcome,
    pub request: &'static str,
    pub expected: &'static str,
}

pub const SHOTS: [Shot; 3] = [
    Shot {
        outcome: ShotOutcome::Identical,
        request: r#"
Worked example 1. Compare the reference JSON with the briefing JSON and answer as the rules say.

----------------  🟢 REFERENCE JSON  ----------------
{reference_json}
----------------  🟠 BRIEFING JSON  ----------------
{briefing_json}
"#,
        expected: "NO_DIFF",
    },
    Shot {
        outcome: ShotOutcome::DateAndAmountMismatch,
        request: r#"
Worked example 2. Compare the reference JSON with the briefing JSON and answer as the rules say.

----------------  🟢 REFERENCE JSON  ----------------
{reference_json}
----------------  🟠 BRIEFING JSON  ----------------
{briefing_json}
"#,
        expected: r#"
- 🔴 `commercial_activity.start_date`: expected `2025-04-01`, got `2025-04-03`
- 🟠 `success_criteria[0].min_amount`: expected `300`, got `250`
"#,
    },
    Shot {
        outcome: ShotOutcome::DescriptionAndSegmentationMismatch,
        request: r#"
Worked example 3. Compare the reference JSON with the briefing JSON and answer as the rules say.

----------------  🟢 REFERENCE JSON  ----------------
{reference_json}
----------------  🟠 BRIEFING JSON  ----------------
{briefing_json}
"#,
        expected: r#"
- 🟠 `description`: wording differs once case and whitespace are ignored
- 🔴 `customer_segmentation`: expected `null`, got a segment named *Clientes-Alta* (an open
      campaign carries no segmentation)
"#,
    },
];

/// Final user turn appended for each real comparison.
pub const COMPARISON_REQUEST: &str = r#"
Compare the two JSON documents below. Apply the rules and reply with NO_DIFF or a bullet list of
discrepancies.

================  🟠 BRIEFING JSON  ================
{briefing_json}
================  🟢 REFERENCE JSON  ================
{reference_json}
"#;

/// Single-turn instruction that turns a spreadsheet dump into briefing JSON.
pub fn conversion_request(sheet_dump: &str, canonical_example: &str) -> String {
    format!(
        r#"Turn the following Excel content into a JSON document:

{sheet_dump}

Formatting rules:
- The root key is 'briefing accion comercial'.
- 'informacion general' is a block holding 'Nombre de la acción Comercial', 'Producto',
  'Abierto/Segmentada', 'Metadata Adobe Campaign' and the other general fields.
- Keep every key exactly as written in the sheet, in Spanish. Do not translate keys such as
  'Nombre de la acción Comercial' or 'Producto'.
- Remove bullet characters such as '•' and literal '\n' sequences from values.
- Text with colons, as in 'descripcion campaña', becomes key-value pairs inside the JSON.
- Values written 'n.a.' become null.
- Dates use the format 'yyyy-mm-dd'.
- Follow the structure of this example; success criteria and metrics depend on the campaign
  typology:
{canonical_example}
- The 'MEDICIONES' section matters most: it carries the campaign platform input, the success
  criteria, if any, and the campaign typology.
- 'descripcion campaña' matters too: it holds the promotional code and conditions such as the
  number of bills to be domiciled.
- Reply with the JSON document only."#
    )
}

/// Fill both slots of a request template in one pass, so text inside a
/// document that happens to look like a slot is left untouched.
pub fn fill(template: &str, reference: &str, briefing: &str) -> String {
    let mut out = String::with_capacity(template.len() + reference.len() + briefing.len());
    let mut rest = template;
    loop {
        let next_ref = rest.find(REFERENCE_SLOT);
        let next_brf = rest.find(BRIEFING_SLOT);
        let (pos, slot, value) = match (next_ref, next_brf) {
            (Some(r), Some(b)) if r < b => (r, REFERENCE_SLOT, reference),
            (Some(_), Some(b)) => (b, BRIEFING_SLOT, briefing),
            (Some(r), None) => (r, REFERENCE_SLOT, reference),
            (None, Some(b)) => (b, BRIEFING_SLOT, briefing),
            (None, None) => break,
        };
        out.push_str(&rest[..pos]);
        out.push_str(value);
        rest = &rest[pos + slot.len()..];
    }
    out.push_str(rest);
    out
}
