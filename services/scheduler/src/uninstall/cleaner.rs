//! Sweeps offered resources the framework still owns.

use berth_proto::{Offer, OfferId, Operation, Resource};

/// The operations to run against one offer.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRecommendation {
    pub offer_id: OfferId,
    pub operations: Vec<Operation>,
}

/// Stateless cleaner: releases every reservation the framework owns that
/// the master happens to re-offer. It does not match offers to steps;
/// the recorder maps accepted operations back onto the plan.
#[derive(Debug, Default)]
pub struct UninstallResourceCleaner;

impl UninstallResourceCleaner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluates one offer cycle. Offers with no processable reservation
    /// are omitted and stay with the caller to decline.
    #[must_use]
    pub fn evaluate(&self, offers: &[Offer]) -> Vec<OfferRecommendation> {
        offers
            .iter()
            .filter_map(|offer| self.evaluate_offer(offer))
            .collect()
    }

    fn evaluate_offer(&self, offer: &Offer) -> Option<OfferRecommendation> {
        let reserved: Vec<Resource> = offer
            .resources
            .iter()
            .filter(|r| r.live_reservation_id().is_some())
            .cloned()
            .collect();
        if reserved.is_empty() {
            return None;
        }

        let volumes: Vec<Resource> = reserved.iter().filter(|r| r.is_volume()).cloned().collect();

        let mut operations = Vec::new();
        if !volumes.is_empty() {
            // Volumes must be destroyed before the backing disk
            // reservation is released, within the same accept call.
            operations.push(Operation::Destroy { volumes });
        }
        operations.push(Operation::Unreserve {
            resources: reserved,
        });

        Some(OfferRecommendation {
            offer_id: offer.id.clone(),
            operations,
        })
    }
}
