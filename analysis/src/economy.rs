use common::demo_analysis::{Team, WinReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemClass {
    Pistol,
    Smg,
    Shotgun,
    Rifle,
    Sniper,
    Heavy,
    Grenade,
    Equipment,
    Knife,
    Taser,
    World,
}

impl ItemClass {
    pub fn is_firearm(self) -> bool {
        matches!(
            self,
            Self::Pistol | Self::Smg | Self::Shotgun | Self::Rifle | Self::Sniper | Self::Heavy
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemInfo {
    pub name: &'static str,
    pub price: u32,
    pub class: ItemClass,
    pub kill_reward: u32,
}

const fn item(name: &'static str, price: u32, class: ItemClass, kill_reward: u32) -> ItemInfo {
    ItemInfo {
        name,
        price,
        class,
        kill_reward,
    }
}

pub static ITEMS: phf::Map<u8, ItemInfo> = phf::phf_map! {
    0_u8 => item("world", 0, ItemClass::World, 0),

    1_u8 => item("glock", 200, ItemClass::Pistol, 300),
    2_u8 => item("usp_silencer", 200, ItemClass::Pistol, 300),
    3_u8 => item("hkp2000", 200, ItemClass::Pistol, 300),
    4_u8 => item("p250", 300, ItemClass::Pistol, 300),
    5_u8 => item("fiveseven", 500, ItemClass::Pistol, 300),
    6_u8 => item("tec9", 500, ItemClass::Pistol, 300),
    7_u8 => item("cz75a", 500, ItemClass::Pistol, 100),
    8_u8 => item("deagle", 700, ItemClass::Pistol, 300),
    9_u8 => item("revolver", 600, ItemClass::Pistol, 300),
    10_u8 => item("elite", 300, ItemClass::Pistol, 300),

    20_u8 => item("mac10", 1050, ItemClass::Smg, 600),
    21_u8 => item("mp9", 1250, ItemClass::Smg, 600),
    22_u8 => item("mp7", 1500, ItemClass::Smg, 600),
    23_u8 => item("mp5sd", 1500, ItemClass::Smg, 600),
    24_u8 => item("ump45", 1200, ItemClass::Smg, 600),
    25_u8 => item("p90", 2350, ItemClass::Smg, 300),
    26_u8 => item("bizon", 1400, ItemClass::Smg, 600),

    30_u8 => item("galilar", 1800, ItemClass::Rifle, 300),
    31_u8 => item("famas", 1950, ItemClass::Rifle, 300),
    32_u8 => item("ak47", 2700, ItemClass::Rifle, 300),
    33_u8 => item("m4a1", 2900, ItemClass::Rifle, 300),
    34_u8 => item("m4a1_silencer", 2900, ItemClass::Rifle, 300),
    35_u8 => item("sg556", 3000, ItemClass::Rifle, 300),
    36_u8 => item("aug", 3300, ItemClass::Rifle, 300),

    40_u8 => item("ssg08", 1700, ItemClass::Sniper, 300),
    41_u8 => item("awp", 4750, ItemClass::Sniper, 100),
    42_u8 => item("g3sg1", 5000, ItemClass::Sniper, 300),
    43_u8 => item("scar20", 5000, ItemClass::Sniper, 300),

    50_u8 => item("nova", 1050, ItemClass::Shotgun, 900),
    51_u8 => item("mag7", 1300, ItemClass::Shotgun, 900),
    52_u8 => item("sawedoff", 1100, ItemClass::Shotgun, 900),
    53_u8 => item("xm1014", 2000, ItemClass::Shotgun, 600),

    55_u8 => item("m249", 5200, ItemClass::Heavy, 300),
    56_u8 => item("negev", 1700, ItemClass::Heavy, 300),

    60_u8 => item("hegrenade", 300, ItemClass::Grenade, 300),
    61_u8 => item("flashbang", 200, ItemClass::Grenade, 300),
    62_u8 => item("smokegrenade", 300, ItemClass::Grenade, 300),
    63_u8 => item("molotov", 400, ItemClass::Grenade, 300),
    64_u8 => item("incgrenade", 500, ItemClass::Grenade, 300),
    65_u8 => item("decoy", 50, ItemClass::Grenade, 300),

    70_u8 => item("vest", 650, ItemClass::Equipment, 0),
    71_u8 => item("vesthelm", 1000, ItemClass::Equipment, 0),
    72_u8 => item("defuser", 400, ItemClass::Equipment, 0),
    73_u8 => item("taser", 200, ItemClass::Taser, 0),

    80_u8 => item("knife", 0, ItemClass::Knife, 1500),
};

static UNKNOWN_ITEM: ItemInfo = item("unknown", 0, ItemClass::World, 0);

/// Item id as it appears in the demo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Item(pub u8);

impl Item {
    pub const WORLD: Item = Item(0);
    pub const KNIFE: Item = Item(80);
    pub const AK47: Item = Item(32);
    pub const M4A1: Item = Item(33);
    pub const AWP: Item = Item(41);
    pub const GLOCK: Item = Item(1);
    pub const USP: Item = Item(2);
    pub const HE_GRENADE: Item = Item(60);
    pub const FLASHBANG: Item = Item(61);
    pub const SMOKE: Item = Item(62);
    pub const MOLOTOV: Item = Item(63);
    pub const VEST_HELMET: Item = Item(71);

    /// Catalog entry, unknown ids resolve to a zero priced placeholder.
    pub fn info(self) -> &'static ItemInfo {
        ITEMS.get(&self.0).unwrap_or(&UNKNOWN_ITEM)
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn class(self) -> ItemClass {
        self.info().class
    }

    /// Grenades that deal damage count as utility damage.
    pub fn is_damaging_utility(self) -> bool {
        matches!(self.info().name, "hegrenade" | "molotov" | "incgrenade")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyType {
    FullBuy,
    PartialBuy,
    Save,
}

impl BuyType {
    pub fn classify(equipment_value: u32) -> Self {
        if equipment_value >= 4000 {
            Self::FullBuy
        } else if equipment_value >= 2000 {
            Self::PartialBuy
        } else {
            Self::Save
        }
    }
}

/// Money rules of a competitive match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EconomyRules {
    pub start_money: u32,
    pub max_money: u32,
    /// Money is reset after this many completed rounds, 0 disables the reset.
    pub rounds_per_half: u32,
    pub win_reward: u32,
    pub objective_win_reward: u32,
    pub loss_bonus_min: u32,
    pub loss_bonus_max: u32,
    pub loss_bonus_step: u32,
    pub plant_bonus: u32,
}

impl Default for EconomyRules {
    fn default() -> Self {
        Self {
            start_money: 800,
            max_money: 16000,
            rounds_per_half: 12,
            win_reward: 3250,
            objective_win_reward: 3500,
            loss_bonus_min: 1400,
            loss_bonus_max: 3400,
            loss_bonus_step: 500,
            plant_bonus: 800,
        }
    }
}

impl EconomyRules {
    pub fn win_reward(&self, team: Team, reason: WinReason) -> u32 {
        match (team, reason) {
            (Team::CT, WinReason::BombDefused) | (Team::T, WinReason::BombExploded) => {
                self.objective_win_reward
            }
            _ => self.win_reward,
        }
    }

    /// Bonus paid to the losing team after `consecutive_losses` lost rounds.
    pub fn loss_bonus(&self, consecutive_losses: u32) -> u32 {
        let steps = consecutive_losses.saturating_sub(1);
        self.loss_bonus_min
            .saturating_add(self.loss_bonus_step.saturating_mul(steps))
            .min(self.loss_bonus_max)
    }

    pub fn is_halftime(&self, completed_rounds: u32) -> bool {
        self.rounds_per_half > 0 && completed_rounds == self.rounds_per_half
    }

    /// Loss streak cap, more losses do not raise the bonus.
    pub fn max_loss_streak(&self) -> u32 {
        if self.loss_bonus_step == 0 {
            return 1;
        }
        (self.loss_bonus_max.saturating_sub(self.loss_bonus_min) / self.loss_bonus_step) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_bonus_ladder() {
        let rules = EconomyRules::default();

        assert_eq!(1400, rules.loss_bonus(1));
        assert_eq!(1900, rules.loss_bonus(2));
        assert_eq!(3400, rules.loss_bonus(5));
        assert_eq!(3400, rules.loss_bonus(9));
        assert_eq!(5, rules.max_loss_streak());
    }

    #[test]
    fn objective_rewards() {
        let rules = EconomyRules::default();

        assert_eq!(3500, rules.win_reward(Team::CT, WinReason::BombDefused));
        assert_eq!(3500, rules.win_reward(Team::T, WinReason::BombExploded));
        assert_eq!(3250, rules.win_reward(Team::T, WinReason::CTKilled));
    }

    #[test]
    fn catalog() {
        assert_eq!("awp", Item::AWP.name());
        assert_eq!(100, Item::AWP.info().kill_reward);
        assert_eq!(1500, Item::KNIFE.info().kill_reward);
        assert!(Item::HE_GRENADE.is_damaging_utility());
        assert!(!Item::FLASHBANG.is_damaging_utility());
        assert_eq!("unknown", Item(250).name());
        assert!(Item::GLOCK.class().is_firearm());
    }

    #[test]
    fn buy_types() {
        assert_eq!(BuyType::FullBuy, BuyType::classify(4750));
        assert_eq!(BuyType::PartialBuy, BuyType::classify(2000));
        assert_eq!(BuyType::Save, BuyType::classify(800));
    }
}
