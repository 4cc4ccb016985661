/// Column names of the ranked table with a one-line description each.
pub const COLUMN_HELP: &[(&str, &str)] = &[
    ("ticker", "Stock ticker symbol (e.g., AAPL, MSFT)"),
    ("price", "Current stock price"),
    ("eps", "Trailing earnings per share (past 12 months)"),
    ("growth", "Estimated earnings growth for the current year"),
    ("pb", "Price-to-book ratio; low values may indicate undervaluation"),
    ("de", "Debt-to-equity ratio; high values may suggest financial risk"),
    ("intrinsic_value", "Estimated fair value using an adjusted Benjamin Graham formula"),
    ("score", "Relative value score: intrinsic value divided by current price"),
    ("buy_under", "Suggested buy-under price using the configured margin of safety"),
    ("actual_mos", "Actual margin of safety = 1 - (price / intrinsic value); 0 if price is too high"),
    ("last_score", "Score from the most recent earlier run (0 if none)"),
    ("score_change", "Change in score since the last run"),
];

pub fn describe(column: &str) -> Option<&'static str> {
    COLUMN_HELP
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, desc)| *desc)
}

pub fn render_help() -> String {
    let mut out = String::from("Column Definitions:\n\n");
    for (name, desc) in COLUMN_HELP {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(desc);
        out.push('\n');
    }
    out
}
