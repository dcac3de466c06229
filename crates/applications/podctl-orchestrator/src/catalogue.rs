//! GPU candidate selection
//!
//! Turns the provider's live catalogue into an ordered list of GPU types that
//! are affordable under a price ceiling, cheapest first.

use crate::error::Result;
use podctl_core::{CloudClient, GpuOffering};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Filter and order offerings by effective spot price.
///
/// Unpriced offerings and those above `max_price` are dropped. The sort is
/// stable, so equal prices keep catalogue order. Offerings with unknown VRAM
/// pass the memory floor.
pub fn rank_offerings(
    offerings: Vec<GpuOffering>,
    max_price: Decimal,
    min_memory_gb: Option<u32>,
) -> Vec<GpuOffering> {
    let mut ranked: Vec<(Decimal, GpuOffering)> = offerings
        .into_iter()
        .filter(|o| match (min_memory_gb, o.memory_gb) {
            (Some(floor), Some(gb)) => gb >= floor,
            _ => true,
        })
        .filter_map(|o| o.effective_price().map(|(price, _)| (price, o)))
        .filter(|(price, _)| *price <= max_price)
        .collect();

    ranked.sort_by_key(|(price, _)| *price);
    ranked.into_iter().map(|(_, o)| o).collect()
}

/// Selects deploy candidates from the live catalogue
pub struct GpuSelector<C: CloudClient> {
    client: Arc<C>,
    min_memory_gb: Option<u32>,
}

impl<C: CloudClient> GpuSelector<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            min_memory_gb: None,
        }
    }

    /// Drop GPU types with less VRAM than this
    pub fn with_min_memory_gb(mut self, gb: Option<u32>) -> Self {
        self.min_memory_gb = gb;
        self
    }

    /// Affordable GPU types, cheapest first. Empty is a valid answer.
    pub async fn select_candidates(&self, max_price: Decimal) -> Result<Vec<GpuOffering>> {
        let catalogue: Vec<GpuOffering> = self
            .client
            .list_gpu_offerings()
            .await?
            .into_iter()
            .map(GpuOffering::from)
            .collect();
        let total = catalogue.len();

        let candidates = rank_offerings(catalogue, max_price, self.min_memory_gb);

        info!(
            total,
            affordable = candidates.len(),
            %max_price,
            "Selected GPU candidates"
        );
        for gpu in &candidates {
            if let Some((price, cloud)) = gpu.effective_price() {
                debug!(gpu = %gpu.display_name, %price, cloud = cloud.as_str(), "Candidate");
            }
        }

        Ok(candidates)
    }
}
