use crate::math::{Point2d, Vector2d};
use cgmath::InnerSpace;
use std::ops::{Index, IndexMut};

/// One of the four compass travel directions.
///
/// The world coordinate system has `x` growing east and `y` growing north.
/// Grid rows grow southward, so a northbound vehicle moves towards lower
/// row indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

/// One of the two perpendicular traffic axes of an intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    NS,
    EW,
}

impl Direction {
    /// All directions in the order the approaches of an intersection
    /// are resolved within a step.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::West,
        Direction::South,
        Direction::East,
    ];

    /// The unit vector of the direction.
    pub fn unit(self) -> Vector2d {
        match self {
            Direction::North => Vector2d::new(0.0, 1.0),
            Direction::East => Vector2d::new(1.0, 0.0),
            Direction::South => Vector2d::new(0.0, -1.0),
            Direction::West => Vector2d::new(-1.0, 0.0),
        }
    }

    /// The direction reached by a right turn.
    pub fn right(self) -> Direction {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
        }
    }

    /// The opposing travel direction.
    pub fn opposite(self) -> Direction {
        self.right().right()
    }

    /// The traffic axis this direction belongs to.
    pub fn axis(self) -> Axis {
        match self {
            Direction::North | Direction::South => Axis::NS,
            Direction::East | Direction::West => Axis::EW,
        }
    }

    /// Signed progress of `point` past `origin` along this direction, in m.
    /// Positive once the point has passed the origin.
    pub fn progress(self, point: Point2d, origin: Point2d) -> f64 {
        (point - origin).dot(self.unit())
    }
}

/// A cell of the intersection grid, `(row, col)` indexed from the
/// north-west corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridIndex {
    pub row: usize,
    pub col: usize,
}

impl GridIndex {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// The neighbouring cell one grid step along `direction`,
    /// or `None` if that step leaves a `rows` x `cols` grid.
    pub fn neighbour(self, direction: Direction, rows: usize, cols: usize) -> Option<GridIndex> {
        let (row, col) = match direction {
            Direction::North => (self.row.checked_sub(1)?, self.col),
            Direction::South => (self.row + 1, self.col),
            Direction::East => (self.row, self.col + 1),
            Direction::West => (self.row, self.col.checked_sub(1)?),
        };
        (row < rows && col < cols).then(|| GridIndex::new(row, col))
    }
}

/// A value per compass direction, indexable by [Direction].
#[derive(Clone, Debug, Default)]
pub struct PerDirection<T>([T; 4]);

fn slot(direction: Direction) -> usize {
    match direction {
        Direction::North => 0,
        Direction::West => 1,
        Direction::South => 2,
        Direction::East => 3,
    }
}

impl<T> PerDirection<T> {
    /// Builds the map by evaluating `f` for every direction.
    pub fn from_fn(f: impl FnMut(Direction) -> T) -> Self {
        Self(Direction::ALL.map(f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Direction, &T)> {
        Direction::ALL.iter().map(move |d| (*d, &self.0[slot(*d)]))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }
}

impl<T> Index<Direction> for PerDirection<T> {
    type Output = T;

    fn index(&self, direction: Direction) -> &T {
        &self.0[slot(direction)]
    }
}

impl<T> IndexMut<Direction> for PerDirection<T> {
    fn index_mut(&mut self, direction: Direction) -> &mut T {
        &mut self.0[slot(direction)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_right_turns_return_home() {
        for d in Direction::ALL {
            assert_eq!(d.right().right().right().right(), d);
            assert_eq!(d.opposite().opposite(), d);
        }
    }

    #[test]
    fn progress_is_signed_along_travel() {
        let origin = Point2d::new(10.0, -5.0);
        let ahead = Point2d::new(10.0, 3.0);
        assert!(Direction::North.progress(ahead, origin) > 0.0);
        assert!(Direction::South.progress(ahead, origin) < 0.0);
        assert_eq!(Direction::East.progress(ahead, origin), 0.0);
    }

    #[test]
    fn neighbour_respects_grid_bounds() {
        let cell = GridIndex::new(0, 1);
        assert_eq!(cell.neighbour(Direction::North, 2, 2), None);
        assert_eq!(
            cell.neighbour(Direction::South, 2, 2),
            Some(GridIndex::new(1, 1))
        );
        assert_eq!(cell.neighbour(Direction::East, 2, 2), None);
        assert_eq!(
            cell.neighbour(Direction::West, 2, 2),
            Some(GridIndex::new(0, 0))
        );
    }
}
