use once_cell::sync::Lazy;
use serde::Serialize;

/// Default plan applied when a payment arrives without an explicit tier.
pub const DEFAULT_PLAN: &str = "BASIC";

/// Storefront placement a plan tier entitles a shop to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementSlot {
    None,
    HomeBanner,
    TopSlider,
    LeftBar,
    RightBar,
    Hero,
}

impl PlacementSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementSlot::None => "NONE",
            PlacementSlot::HomeBanner => "HOME_BANNER",
            PlacementSlot::TopSlider => "TOP_SLIDER",
            PlacementSlot::LeftBar => "LEFT_BAR",
            PlacementSlot::RightBar => "RIGHT_BAR",
            PlacementSlot::Hero => "HERO",
        }
    }
}

/// One plan tier: price, agent commission rate and placement entitlements.
/// The catalog is static; both the payment and deletion reconcilers read
/// commission rates from here so a rate is defined exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub code: &'static str,
    pub amount: i64,
    pub commission_rate: f64,
    pub priority_rank: i32,
    pub placement_slot: PlacementSlot,
    pub max_photos: u32,
    pub has_offers: bool,
    pub has_whatsapp: bool,
    pub has_logo: bool,
}

impl Plan {
    /// Plan-specific commission, rounded to whole currency units.
    pub fn commission(&self, amount: i64) -> i64 {
        (amount as f64 * self.commission_rate).round() as i64
    }
}

static CATALOG: Lazy<Vec<Plan>> = Lazy::new(|| {
    vec![
        Plan { code: "BASIC", amount: 499, commission_rate: 0.20, priority_rank: 0, placement_slot: PlacementSlot::None, max_photos: 1, has_offers: false, has_whatsapp: false, has_logo: false },
        Plan { code: "SILVER", amount: 999, commission_rate: 0.20, priority_rank: 1, placement_slot: PlacementSlot::RightBar, max_photos: 3, has_offers: false, has_whatsapp: true, has_logo: false },
        Plan { code: "GOLD", amount: 1999, commission_rate: 0.25, priority_rank: 2, placement_slot: PlacementSlot::LeftBar, max_photos: 5, has_offers: true, has_whatsapp: true, has_logo: true },
        Plan { code: "PLATINUM", amount: 2999, commission_rate: 0.25, priority_rank: 3, placement_slot: PlacementSlot::TopSlider, max_photos: 8, has_offers: true, has_whatsapp: true, has_logo: true },
        Plan { code: "PREMIUM", amount: 4999, commission_rate: 0.30, priority_rank: 4, placement_slot: PlacementSlot::HomeBanner, max_photos: 12, has_offers: true, has_whatsapp: true, has_logo: true },
        Plan { code: "SPOTLIGHT", amount: 9999, commission_rate: 0.30, priority_rank: 5, placement_slot: PlacementSlot::Hero, max_photos: 20, has_offers: true, has_whatsapp: true, has_logo: true },
    ]
});

pub fn catalog() -> &'static [Plan] {
    &CATALOG
}

pub async fn list_plans() -> axum::Json<Vec<Plan>> {
    axum::Json(CATALOG.clone())
}

/// Case-insensitive lookup. `None` means the code is unknown to the catalog.
pub fn find(code: &str) -> Option<&'static Plan> {
    let trimmed = code.trim();
    CATALOG
        .iter()
        .find(|plan| plan.code.eq_ignore_ascii_case(trimmed))
}
