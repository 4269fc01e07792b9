use crate::model::Categories;

/// Builds the instruction text sent with every batch: the vocabulary, the exact output shape, and
/// the few tie-breaking rules the categories need.
pub(crate) fn instructions(categories: &Categories) -> String {
    let list = categories
        .names()
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<String>>()
        .join(", ");
    let fallback = categories.fallback();

    format!(
        r#"You classify bank transactions using only their description and amount.

Pick exactly ONE category for each row from this list:
[{list}]

Return ONLY valid JSON. No markdown, no commentary.

The output must have exactly this shape, with one item per input row:
{{
  "items": [
    {{
      "row_id": 0,
      "category": "Food",
      "confidence": 0.85
    }}
  ]
}}

Rules:
- "row_id" must repeat the row_id of the input row.
- "confidence" must be a number from 0 to 1.
- If a row is unclear, use "{fallback}" with a low confidence.
- Paying yourself or moving money between accounts is "Transfer".
- A positive, payroll-like amount is "Income"."#
    )
}
