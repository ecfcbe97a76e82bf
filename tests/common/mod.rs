//! Simulated two-wire bus with a single slave device.
//!
//! Lines are wired-AND: a line reads high only when neither the master nor
//! the slave pulls it low. The slave reacts to START/STOP and SCL edges the
//! way a real device would.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use avr_soft_i2c::hal::{HalfPeriodDelay, InterruptControl, OpenDrainLine, SoftI2c};
use avr_soft_i2c::BusConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    SdaLow,
    SdaRelease,
    SclLow,
    SclRelease,
    Delay,
    Suppress,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Stop,
    /// Slave saw its address; bool is whether it acknowledged
    Addressed(u8, bool),
    /// Byte written by the master and whether the slave acknowledged it
    Received(u8, bool),
    /// Byte sent by the slave and the master's answer (true = ACK)
    Sent(u8, bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Address { bits: u8, value: u8 },
    AddressAck { read: bool },
    Ignore,
    Receive { bits: u8, value: u8 },
    ReceiveAck,
    Transmit { byte: u8, sent: u8 },
    MasterAck { byte: u8 },
}

pub struct Slave {
    pub address: u8,
    /// Number of upcoming address phases to refuse (busy device)
    pub busy_for: u32,
    /// Refuse data bytes once this many were accepted
    pub accept_limit: Option<usize>,
    /// SCL polls to hold the clock low for on every ACK clock
    pub stretch_polls: u32,
    /// SCL polls to hold the clock low for on every clock of a read,
    /// data bits and the master's ACK alike
    pub stretch_reads: u32,
    pub memory: VecDeque<u8>,
    phase: Phase,
}

impl Slave {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            busy_for: 0,
            accept_limit: None,
            stretch_polls: 0,
            stretch_reads: 0,
            memory: VecDeque::new(),
            phase: Phase::Idle,
        }
    }
}

pub struct Wire {
    master_sda_low: bool,
    master_scl_low: bool,
    slave_sda_low: bool,
    slave_scl_low: bool,
    stretch_remaining: u32,
    sda: bool,
    scl: bool,
    received: usize,
    pub slave: Slave,
    pub ops: Vec<Op>,
    pub events: Vec<Event>,
    pub scl_polls: u32,
    /// SDA level sampled by the slave on the last master-ACK clock
    pub master_acks: Vec<bool>,
}

impl Wire {
    pub fn new(slave: Slave) -> Self {
        Self {
            master_sda_low: false,
            master_scl_low: false,
            slave_sda_low: false,
            slave_scl_low: false,
            stretch_remaining: 0,
            sda: true,
            scl: true,
            received: 0,
            slave,
            ops: Vec::new(),
            events: Vec::new(),
            scl_polls: 0,
            master_acks: Vec::new(),
        }
    }

    pub fn sda(&self) -> bool {
        self.sda
    }

    pub fn scl(&self) -> bool {
        self.scl
    }

    pub fn count(&self, event: fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| event(e)).count()
    }

    fn set_master_sda(&mut self, low: bool) {
        self.ops.push(if low { Op::SdaLow } else { Op::SdaRelease });
        self.master_sda_low = low;
        self.settle();
    }

    fn set_master_scl(&mut self, low: bool) {
        self.ops.push(if low { Op::SclLow } else { Op::SclRelease });
        self.master_scl_low = low;
        let stretch = match self.slave.phase {
            Phase::AddressAck { .. } | Phase::ReceiveAck => self.slave.stretch_polls,
            Phase::Transmit { .. } | Phase::MasterAck { .. } => self.slave.stretch_reads,
            _ => 0,
        };
        if !low && stretch > 0 {
            self.stretch_remaining = stretch;
            self.slave_scl_low = true;
        }
        self.settle();
    }

    fn poll_scl(&mut self) -> bool {
        self.scl_polls += 1;
        if self.slave_scl_low {
            self.stretch_remaining = self.stretch_remaining.saturating_sub(1);
            if self.stretch_remaining == 0 {
                self.slave_scl_low = false;
                self.settle();
            }
        }
        self.scl
    }

    fn settle(&mut self) {
        let sda = !(self.master_sda_low || self.slave_sda_low);
        let scl = !(self.master_scl_low || self.slave_scl_low);
        let (old_sda, old_scl) = (self.sda, self.scl);
        self.sda = sda;
        self.scl = scl;

        if scl && old_scl && sda != old_sda {
            if sda {
                self.on_stop();
            } else {
                self.on_start();
            }
        } else if scl && !old_scl {
            self.on_scl_rise();
        } else if !scl && old_scl {
            self.on_scl_fall();
        }

        // Slave moved SDA while SCL is low; that is never a condition.
        self.sda = !(self.master_sda_low || self.slave_sda_low);
    }

    fn on_start(&mut self) {
        self.events.push(Event::Start);
        self.slave_sda_low = false;
        self.slave.phase = Phase::Address { bits: 0, value: 0 };
    }

    fn on_stop(&mut self) {
        self.events.push(Event::Stop);
        self.slave_sda_low = false;
        self.slave.phase = Phase::Idle;
    }

    fn on_scl_rise(&mut self) {
        let sda = self.sda;
        match self.slave.phase {
            Phase::Address { bits, value } => {
                self.slave.phase = Phase::Address {
                    bits: bits + 1,
                    value: (value << 1) | sda as u8,
                };
            }
            Phase::Receive { bits, value } => {
                self.slave.phase = Phase::Receive {
                    bits: bits + 1,
                    value: (value << 1) | sda as u8,
                };
            }
            Phase::MasterAck { byte } => {
                let ack = !sda;
                self.master_acks.push(ack);
                self.events.push(Event::Sent(byte, ack));
            }
            _ => {}
        }
    }

    fn on_scl_fall(&mut self) {
        match self.slave.phase {
            Phase::Address { bits: 8, value } => {
                let matches = value >> 1 == self.slave.address;
                let ack = matches && self.slave.busy_for == 0;
                if matches && self.slave.busy_for > 0 {
                    self.slave.busy_for -= 1;
                }
                self.events.push(Event::Addressed(value, ack));
                if ack {
                    self.slave_sda_low = true;
                    self.slave.phase = Phase::AddressAck { read: value & 1 == 1 };
                } else {
                    self.slave.phase = Phase::Ignore;
                }
            }
            Phase::AddressAck { read: true } => {
                let byte = self.slave.memory.pop_front().unwrap_or(0xFF);
                self.present(byte, 0);
                self.slave.phase = Phase::Transmit { byte, sent: 0 };
            }
            Phase::AddressAck { read: false } | Phase::ReceiveAck => {
                self.slave_sda_low = false;
                self.slave.phase = Phase::Receive { bits: 0, value: 0 };
            }
            Phase::Receive { bits: 8, value } => {
                let ack = self.slave.accept_limit.map_or(true, |limit| self.received < limit);
                self.events.push(Event::Received(value, ack));
                if ack {
                    self.received += 1;
                    self.slave.memory.push_back(value);
                    self.slave_sda_low = true;
                    self.slave.phase = Phase::ReceiveAck;
                } else {
                    self.slave.phase = Phase::Ignore;
                }
            }
            Phase::Transmit { byte, sent } => {
                let sent = sent + 1;
                if sent < 8 {
                    self.present(byte, sent);
                    self.slave.phase = Phase::Transmit { byte, sent };
                } else {
                    self.slave_sda_low = false;
                    self.slave.phase = Phase::MasterAck { byte };
                }
            }
            Phase::MasterAck { .. } => {
                if self.master_acks.last() == Some(&true) {
                    let byte = self.slave.memory.pop_front().unwrap_or(0xFF);
                    self.present(byte, 0);
                    self.slave.phase = Phase::Transmit { byte, sent: 0 };
                } else {
                    self.slave.phase = Phase::Ignore;
                }
            }
            _ => {}
        }
    }

    fn present(&mut self, byte: u8, sent: u8) {
        self.slave_sda_low = byte & (0x80 >> sent) == 0;
    }
}

pub type SharedWire = Rc<RefCell<Wire>>;

pub struct SimSda(pub SharedWire);
pub struct SimScl(pub SharedWire);
pub struct SimDelay(pub SharedWire);
pub struct SimInterrupts(pub SharedWire);

impl OpenDrainLine for SimSda {
    fn drive_low(&mut self) {
        self.0.borrow_mut().set_master_sda(true);
    }

    fn release(&mut self) {
        self.0.borrow_mut().set_master_sda(false);
    }

    fn is_high(&self) -> bool {
        self.0.borrow().sda()
    }
}

impl OpenDrainLine for SimScl {
    fn drive_low(&mut self) {
        self.0.borrow_mut().set_master_scl(true);
    }

    fn release(&mut self) {
        self.0.borrow_mut().set_master_scl(false);
    }

    fn is_high(&self) -> bool {
        self.0.borrow_mut().poll_scl()
    }
}

impl HalfPeriodDelay for SimDelay {
    fn delay_half_period(&mut self) {
        self.0.borrow_mut().ops.push(Op::Delay);
    }
}

impl InterruptControl for SimInterrupts {
    fn suppress(&mut self) {
        self.0.borrow_mut().ops.push(Op::Suppress);
    }

    fn restore(&mut self) {
        self.0.borrow_mut().ops.push(Op::Restore);
    }
}

pub type SimBus = SoftI2c<SimSda, SimScl, SimDelay, SimInterrupts>;

pub fn sim_config() -> BusConfig {
    BusConfig::new(16_000_000)
}

pub fn bus_with(slave: Slave, config: BusConfig) -> (SimBus, SharedWire) {
    let wire = Rc::new(RefCell::new(Wire::new(slave)));
    let mut bus = SoftI2c::with_interrupts(
        SimSda(wire.clone()),
        SimScl(wire.clone()),
        SimDelay(wire.clone()),
        SimInterrupts(wire.clone()),
        config,
    );
    bus.initialize();
    wire.borrow_mut().ops.clear();
    (bus, wire)
}

pub fn bus(slave: Slave) -> (SimBus, SharedWire) {
    bus_with(slave, sim_config())
}
