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
//! Placement of the motes of a simulated WSN.

/// Position of a single mote in the simulation area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotePosition {
    /// Cooja mote identifier, starting at 1 for the root.
    pub id: usize,
    pub x: f64,
    pub y: f64,
}

impl MotePosition {
    /// Cooja `<mote>` element for a mote of the given mote type.
    pub fn to_xml(&self, mote_type: &str) -> String {
        format!(
            "    <mote>\n      \
             <interface_config>\n        \
             org.contikios.cooja.interfaces.Position\n        \
             <x>{:.2}</x>\n        <y>{:.2}</y>\n        <z>0.0</z>\n      \
             </interface_config>\n      \
             <interface_config>\n        \
             org.contikios.cooja.mspmote.interfaces.MspMoteID\n        \
             <id>{}</id>\n      \
             </interface_config>\n      \
             <motetype_identifier>{mote_type}</motetype_identifier>\n    \
             </mote>",
            self.x, self.y, self.id
        )
    }

    pub fn distance(&self, other: &MotePosition) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Positions of all motes of an experiment: the DODAG root, the sensors and the malicious mote.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub root: MotePosition,
    pub sensors: Vec<MotePosition>,
    pub malicious: MotePosition,
}

impl Layout {
    /// Place the root at the origin and the `n` sensors on a square grid growing around it, with
    /// a spacing small enough for every sensor to reach its grid neighbors and for the whole
    /// grid to fit in the area. The malicious mote sits between the root and its first
    /// neighbors, so that it can attract their traffic.
    pub fn grid(n: usize, tx_range: f64, area_side: f64) -> Self {
        let side = ((n + 1) as f64).sqrt().ceil() as usize;
        let spacing = if side > 1 {
            (0.8 * tx_range).min(area_side / (side - 1) as f64)
        } else {
            0.8 * tx_range
        };

        let mut cells: Vec<(usize, usize)> = (0..side)
            .flat_map(|i| (0..side).map(move |j| (i, j)))
            .filter(|&cell| cell != (0, 0))
            .collect();
        // fill the grid ring by ring, closest cells first
        cells.sort_by_key(|&(i, j)| (i.max(j), i * i + j * j, i, j));

        let sensors = cells
            .into_iter()
            .take(n)
            .enumerate()
            .map(|(k, (i, j))| MotePosition {
                id: k + 2,
                x: i as f64 * spacing,
                y: j as f64 * spacing,
            })
            .collect();

        Self {
            root: MotePosition {
                id: 1,
                x: 0.0,
                y: 0.0,
            },
            sensors,
            malicious: MotePosition {
                id: n + 2,
                x: spacing / 2.0,
                y: spacing / 2.0,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn grid_layout() {
        let layout = Layout::grid(10, 50.0, 100.0);
        assert_eq!(layout.sensors.len(), 10);
        assert_eq!(layout.root.id, 1);
        assert_eq!(layout.malicious.id, 12);

        let ids: Vec<usize> = layout.sensors.iter().map(|m| m.id).collect();
        assert_eq!(ids, (2..=11).collect::<Vec<_>>());

        for mote in &layout.sensors {
            assert!(mote.x <= 100.0 && mote.y <= 100.0);
            // some grid neighbor (or the root) is in range
            let connected = std::iter::once(&layout.root)
                .chain(layout.sensors.iter())
                .any(|other| other.id != mote.id && mote.distance(other) <= 50.0);
            assert!(connected, "{mote:?} is isolated");
        }
        assert!(layout.malicious.distance(&layout.root) <= 50.0);
    }

    #[test]
    fn small_area_shrinks_spacing() {
        let layout = Layout::grid(99, 50.0, 90.0);
        let max = layout
            .sensors
            .iter()
            .map(|m| m.x.max(m.y))
            .fold(0.0, f64::max);
        assert!(max <= 90.0 + 1e-9);
    }

    #[test]
    fn mote_xml() {
        let xml = MotePosition {
            id: 3,
            x: 1.0,
            y: 2.5,
        }
        .to_xml("sensor");
        assert!(xml.contains("<x>1.00</x>"));
        assert!(xml.contains("<y>2.50</y>"));
        assert!(xml.contains("<id>3</id>"));
        assert!(xml.contains("<motetype_identifier>sensor</motetype_identifier>"));
    }
}
