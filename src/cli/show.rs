use super::ui;
use crate::core::equity::{EquityProfile, MonetaryField};
use crate::core::store::ProfileStore;
use anyhow::{Context, Result};
use comfy_table::Cell;

fn monetary_cell(profile: &EquityProfile, field: MonetaryField) -> Cell {
    let unresolved = profile.unresolved.iter().any(|u| u.field == field);
    let value = match field {
        MonetaryField::Price => profile.price,
        MonetaryField::MarketCap => profile.market_cap,
    };
    ui::money_cell(value, unresolved)
}

/// Renders profiles as a table, flagging single-source records without an
/// ISIN as low confidence.
pub fn display_profiles(profiles: &[EquityProfile]) -> String {
    let base = profiles.first().map_or("base", |p| p.currency.as_str());
    let price_header = format!("Price ({base})");
    let cap_header = format!("Market Cap ({base})");

    let mut table = ui::profile_table(&[
        "ISIN",
        "Symbol",
        "Exchange",
        "Name",
        &price_header,
        &cap_header,
        "Sources",
    ]);

    for profile in profiles {
        let sources = profile.source_names().join(", ");
        let sources = if profile.is_low_confidence() {
            ui::paint(&format!("{sources} (low confidence)"), ui::Tone::Muted)
        } else {
            sources
        };

        table.add_row(vec![
            Cell::new(profile.isin.as_deref().unwrap_or("-")),
            Cell::new(&profile.symbol),
            Cell::new(&profile.exchange),
            Cell::new(&profile.name),
            monetary_cell(profile, MonetaryField::Price),
            monetary_cell(profile, MonetaryField::MarketCap),
            Cell::new(sources),
        ]);
    }

    format!(
        "{}\n\n{table}\n\n{}",
        ui::paint("Equity Profiles", ui::Tone::Heading),
        ui::total_line("Total", profiles.len())
    )
}

/// Prints the profile set from the last successful aggregation.
pub async fn run(store: &dyn ProfileStore) -> Result<()> {
    let profiles = store
        .load_all()
        .await
        .context("Failed to load stored profiles")?;

    if profiles.is_empty() {
        println!("No profiles stored yet, run `aggregate` first.");
        return Ok(());
    }
    println!("{}", display_profiles(&profiles));
    Ok(())
}
