//! Shared fixtures for unit tests

use hub_core::{
    ActionTypeId, EventTypeId, ParamTypeId, StateTypeId, ThingClassId, ThingId, Value, ValueType,
};
use hub_event_bus::EventBus;
use hub_things::{
    ActionType, EventType, Interface, ParamType, StateType, ThingClass, ThingManager,
    ThingRegistry,
};
use std::sync::Arc;

/// A registry with lamps implementing "light" and plain temperature sensors
pub(crate) struct Home {
    pub bus: Arc<EventBus>,
    pub things: Arc<ThingManager>,
    pub lamp_class: ThingClassId,
    pub sensor_class: ThingClassId,
    pub power: StateTypeId,
    pub brightness: StateTypeId,
    pub temperature: StateTypeId,
    pub pressed: EventTypeId,
    pub button: ParamTypeId,
    pub set_power: ActionTypeId,
    pub power_param: ParamTypeId,
    pub set_brightness: ActionTypeId,
    pub brightness_param: ParamTypeId,
}

impl Home {
    pub fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        let things = Arc::new(ThingManager::new(bus.clone()));

        things.add_interface(
            Interface::new("light")
                .with_state("power")
                .with_event("pressed")
                .with_action("power"),
        );

        let power = StateType::new("power", ValueType::Bool, Value::Bool(false));
        let brightness =
            StateType::new("brightness", ValueType::Int, Value::Int(0)).with_range(0, 100);
        let button = ParamType::new("button", ValueType::Int);
        let pressed = EventType::new("pressed").with_param(button.clone());
        let power_param = ParamType::new("power", ValueType::Bool);
        let set_power = ActionType::new("power").with_param(power_param.clone());
        let brightness_param = ParamType::new("brightness", ValueType::Int).with_range(0, 100);
        let set_brightness = ActionType::new("brightness").with_param(brightness_param.clone());

        let lamp_class = ThingClass::new("Lamp")
            .with_interface("light")
            .with_state_type(power.clone())
            .with_state_type(brightness.clone())
            .with_event_type(pressed.clone())
            .with_action_type(set_power.clone())
            .with_action_type(set_brightness.clone());

        let temperature = StateType::new("temperature", ValueType::Float, Value::Float(20.0));
        let sensor_class = ThingClass::new("Sensor").with_state_type(temperature.clone());

        let home = Self {
            bus,
            things,
            lamp_class: lamp_class.id,
            sensor_class: sensor_class.id,
            power: power.id,
            brightness: brightness.id,
            temperature: temperature.id,
            pressed: pressed.id,
            button: button.id,
            set_power: set_power.id,
            power_param: power_param.id,
            set_brightness: set_brightness.id,
            brightness_param: brightness_param.id,
        };
        home.things.add_thing_class(lamp_class);
        home.things.add_thing_class(sensor_class);
        home
    }

    pub fn add_lamp(&self, name: &str) -> ThingId {
        self.things.add_thing(name, self.lamp_class).unwrap()
    }

    pub fn add_sensor(&self, name: &str) -> ThingId {
        self.things.add_thing(name, self.sensor_class).unwrap()
    }

    pub fn registry(&self) -> &dyn ThingRegistry {
        self.things.as_ref()
    }
}
