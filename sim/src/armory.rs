//! Weapon catalogue.
//!
//! `WeaponType` is immutable data owned by the `Armory` resource; soldiers carry
//! `Weapon` instances that point into it and own a reload countdown.

use crate::error::{SimError, SimResult};
use crate::timer::Countdown;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// What a projectile hit, for damage lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetClass {
    Soldier,
    Vehicle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponType {
    pub name: String,
    pub range: f32,
    pub velocity: f32,
    pub reload_time: f32,
    /// Aim variation (radians) when the shooter stands still.
    pub variation: f32,
    pub damage_soldier: f32,
    pub damage_vehicle: f32,
    pub sound_radius: f32,
    /// Mounted weapons are never dropped as loot.
    pub vehicle_mounted: bool,
}

impl WeaponType {
    pub fn damage_against(&self, class: TargetClass) -> f32 {
        match class {
            TargetClass::Soldier => self.damage_soldier,
            TargetClass::Vehicle => self.damage_vehicle,
        }
    }

    /// Seconds a bullet of this weapon lives.
    pub fn flight_time(&self) -> f32 {
        if self.velocity <= 0.0 {
            0.0
        } else {
            self.range / self.velocity
        }
    }
}

/// Index into the `Armory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeaponTypeId(pub usize);

/// A carried weapon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weapon {
    pub kind: WeaponTypeId,
    reload: Countdown,
}

impl Weapon {
    /// A loaded weapon.
    pub fn new(kind: WeaponTypeId, reload_time: f32) -> Self {
        Self {
            kind,
            reload: Countdown::one_shot(reload_time).expired(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.reload.is_finished()
    }

    pub fn reload_remaining(&self) -> f32 {
        self.reload.remaining()
    }

    /// Called after a discharge.
    pub fn start_reload(&mut self) {
        self.reload.rewind();
    }

    pub fn tick(&mut self, dt: f32) {
        self.reload.tick(dt);
    }
}

/// The weapon catalogue shared by every soldier and vehicle.
#[derive(Resource, Debug, Clone)]
pub struct Armory {
    types: Vec<WeaponType>,
}

impl Default for Armory {
    fn default() -> Self {
        Self::standard()
    }
}

impl Armory {
    pub fn empty() -> Self {
        Self { types: Vec::new() }
    }

    /// Infantry small arms plus one vehicle gun.
    pub fn standard() -> Self {
        let mut armory = Self::empty();
        let deg = |d: f32| d.to_radians();
        armory.register(WeaponType {
            name: "Rifle".into(),
            range: 300.0,
            velocity: 700.0,
            reload_time: 1.2,
            variation: deg(1.0),
            damage_soldier: 120.0,
            damage_vehicle: 1.0,
            sound_radius: 150.0,
            vehicle_mounted: false,
        });
        armory.register(WeaponType {
            name: "Assault Rifle".into(),
            range: 200.0,
            velocity: 650.0,
            reload_time: 0.25,
            variation: deg(3.0),
            damage_soldier: 40.0,
            damage_vehicle: 1.0,
            sound_radius: 120.0,
            vehicle_mounted: false,
        });
        armory.register(WeaponType {
            name: "Machine Gun".into(),
            range: 350.0,
            velocity: 750.0,
            reload_time: 0.1,
            variation: deg(4.0),
            damage_soldier: 35.0,
            damage_vehicle: 2.0,
            sound_radius: 180.0,
            vehicle_mounted: false,
        });
        armory.register(WeaponType {
            name: "Pistol".into(),
            range: 50.0,
            velocity: 350.0,
            reload_time: 0.5,
            variation: deg(3.0),
            damage_soldier: 30.0,
            damage_vehicle: 0.5,
            sound_radius: 60.0,
            vehicle_mounted: false,
        });
        armory.register(WeaponType {
            name: "Bazooka".into(),
            range: 150.0,
            velocity: 120.0,
            reload_time: 6.0,
            variation: deg(2.0),
            damage_soldier: 150.0,
            damage_vehicle: 250.0,
            sound_radius: 200.0,
            vehicle_mounted: false,
        });
        armory.register(WeaponType {
            name: "Autocannon".into(),
            range: 400.0,
            velocity: 900.0,
            reload_time: 0.4,
            variation: deg(1.5),
            damage_soldier: 150.0,
            damage_vehicle: 60.0,
            sound_radius: 300.0,
            vehicle_mounted: true,
        });
        armory
    }

    pub fn register(&mut self, weapon: WeaponType) -> WeaponTypeId {
        self.types.push(weapon);
        WeaponTypeId(self.types.len() - 1)
    }

    /// Panics on an id not issued by this armory.
    pub fn get(&self, id: WeaponTypeId) -> &WeaponType {
        &self.types[id.0]
    }

    pub fn find(&self, name: &str) -> Option<WeaponTypeId> {
        self.types
            .iter()
            .position(|w| w.name.eq_ignore_ascii_case(name))
            .map(WeaponTypeId)
    }

    /// A loaded instance of the named weapon.
    pub fn issue(&self, name: &str) -> SimResult<Weapon> {
        let id = self
            .find(name)
            .ok_or_else(|| SimError::UnknownWeapon(name.to_string()))?;
        Ok(Weapon::new(id, self.get(id).reload_time))
    }

    pub fn issue_id(&self, id: WeaponTypeId) -> Weapon {
        Weapon::new(id, self.get(id).reload_time)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_by_name() {
        let armory = Armory::standard();
        let rifle = armory.issue("rifle").unwrap();
        assert!(rifle.is_loaded());
        assert_eq!(armory.get(rifle.kind).name, "Rifle");
        assert!(matches!(armory.issue("Trebuchet"), Err(SimError::UnknownWeapon(_))));
    }

    #[test]
    fn test_reload_cycle() {
        let armory = Armory::standard();
        let mut weapon = armory.issue("Rifle").unwrap();
        weapon.start_reload();
        assert!(!weapon.is_loaded());
        weapon.tick(1.0);
        assert!(!weapon.is_loaded());
        weapon.tick(0.3);
        assert!(weapon.is_loaded());
    }

    #[test]
    fn test_flight_time_is_range_over_velocity() {
        let armory = Armory::standard();
        let rifle = armory.get(armory.find("Rifle").unwrap());
        assert!((rifle.flight_time() - 300.0 / 700.0).abs() < 1e-6);
        assert!(rifle.damage_against(TargetClass::Soldier) > rifle.damage_against(TargetClass::Vehicle));
    }
}
