// RPLA: Generation and Execution of RPL Attack Experiments on Simulated Sensor Networks
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Library for generating and running experiments of attacks on RPL, the routing protocol of
//! low-power sensor networks, with Contiki and its network simulator Cooja.

pub mod commands;
pub mod config;
pub mod experiments;
pub mod parameters;
pub mod setup;
pub mod template;
pub mod topology;
pub mod util;

#[cfg(test)]
mod test;

pub mod prelude {
    pub use super::{
        commands::{dispatch, TaskContext, TaskError},
        config::Config,
        experiments::{make, make_all, run, run_all, BuiltBinaries, CampaignReport, MakeReport},
        parameters::{Parameters, RawParameters, Target},
        setup::UpgradePolicy,
    };
}
