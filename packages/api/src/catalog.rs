//! The fixed catalog of purchasable bundles.

/// Days of access granted by one subscription purchase.
pub const SUBSCRIPTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bundle {
    pub id: i32,
    pub name: &'static str,
    pub credits: i32,
    /// Price in cents (USD)
    pub price_cents: i32,
    pub bonus_credits: i32,
    pub is_popular: bool,
    pub is_subscription: bool,
}

impl Bundle {
    /// Credits added to the balance by one purchase of this bundle.
    pub fn total_credits(&self) -> i32 {
        self.credits + self.bonus_credits
    }

    pub fn price_dollars(&self) -> f64 {
        f64::from(self.price_cents) / 100.0
    }
}

pub const BUNDLES: [Bundle; 4] = [
    Bundle {
        id: 1,
        name: "Single Essay",
        credits: 1,
        price_cents: 150,
        bonus_credits: 0,
        is_popular: false,
        is_subscription: false,
    },
    Bundle {
        id: 2,
        name: "5 Essay Pack",
        credits: 5,
        price_cents: 500,
        bonus_credits: 1,
        is_popular: true,
        is_subscription: false,
    },
    Bundle {
        id: 3,
        name: "10 Essay Pack",
        credits: 10,
        price_cents: 850,
        bonus_credits: 2,
        is_popular: false,
        is_subscription: false,
    },
    Bundle {
        id: 4,
        name: "Unlimited Monthly",
        credits: 0,
        price_cents: 1500,
        bonus_credits: 0,
        is_popular: false,
        is_subscription: true,
    },
];

pub fn bundle(id: i32) -> Option<&'static Bundle> {
    BUNDLES.iter().find(|b| b.id == id)
}
