use std::fs;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use cityguide_core::curation::swipe_cards;
use cityguide_core::{find_alternatives, Poi, PoiCache, SwipeCard, Waypoint};

use super::discover::LocatorArgs;
use crate::{AppContext, AppError, DisplayFallback, Result};

#[derive(Args, Debug)]
pub struct AlternativesArgs {
    #[command(flatten)]
    pub locator: LocatorArgs,
    /// JSON file holding the current route as an array of waypoints
    #[arg(long)]
    pub route: PathBuf,
    /// Index of the stop to replace
    #[arg(long)]
    pub reference: usize,
    /// JSON file with POIs swapped out earlier
    #[arg(long)]
    pub replaced: Option<PathBuf>,
    /// Maximum cards returned
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct AlternativesReport {
    pub reference: String,
    pub cards: Vec<SwipeCard>,
}

impl DisplayFallback for AlternativesReport {
    fn display(&self) -> String {
        if self.cards.is_empty() {
            return format!("No alternatives for {}", self.reference);
        }
        let mut lines = vec![format!("Alternatives for {}:", self.reference)];
        for card in &self.cards {
            let candidate = &card.candidate;
            let marker = if card.was_previously_replaced() { " (earlier pick)" } else { "" };
            lines.push(format!(
                "  - {} [{}] {:.0} m{}",
                candidate.poi.name, candidate.poi.category, candidate.distance_m, marker
            ));
            if let Some(summary) = card.enrichment.as_ref().and_then(|e| e.summary.as_deref()) {
                lines.push(format!("      {summary}"));
            }
        }
        lines.join("\n")
    }
}

impl AppContext {
    pub(crate) fn alternatives(&self, args: &AlternativesArgs) -> Result<AlternativesReport> {
        let locator = args.locator.locator()?;
        let snapshot = self.open_cache()?.load()?;
        let entry = snapshot.for_locator(&locator).ok_or_else(|| {
            AppError::MissingResource(format!(
                "no cached discovery for {locator}; run discover --use-cache first"
            ))
        })?;

        let route: Vec<Waypoint> = serde_json::from_str(&fs::read_to_string(&args.route)?)?;
        let reference = route.get(args.reference).ok_or_else(|| {
            AppError::InvalidArguments(format!(
                "reference index {} outside route of {} stops",
                args.reference,
                route.len()
            ))
        })?;
        let replaced: Vec<Poi> = match &args.replaced {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => Vec::new(),
        };

        let candidates = find_alternatives(&entry.pois, &replaced, reference, &route);
        let mut cards = swipe_cards(candidates, &entry.enrichment);
        cards.truncate(args.limit);
        Ok(AlternativesReport {
            reference: reference.name.clone(),
            cards,
        })
    }
}
