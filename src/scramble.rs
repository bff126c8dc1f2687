use crate::cube_mode::CubeMode;
use crate::settings::SCRAMBLE_MOVE_COUNT;
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    RightLeft,
    UpDown,
    FrontBack,
}

/// A turnable layer and the axis it rotates around
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Face {
    name: &'static str,
    axis: Axis,
}

const fn face(name: &'static str, axis: Axis) -> Face {
    Face { name, axis }
}

const OUTER_FACES: [Face; 6] = [
    face("R", Axis::RightLeft),
    face("L", Axis::RightLeft),
    face("U", Axis::UpDown),
    face("D", Axis::UpDown),
    face("F", Axis::FrontBack),
    face("B", Axis::FrontBack),
];

const FOUR_WIDE: [Face; 3] = [
    face("Rw", Axis::RightLeft),
    face("Uw", Axis::UpDown),
    face("Fw", Axis::FrontBack),
];

const FIVE_WIDE: [Face; 6] = [
    face("Rw", Axis::RightLeft),
    face("Lw", Axis::RightLeft),
    face("Uw", Axis::UpDown),
    face("Dw", Axis::UpDown),
    face("Fw", Axis::FrontBack),
    face("Bw", Axis::FrontBack),
];

const CUBE_MODIFIERS: [&str; 3] = ["", "'", "2"];
const CORNER_MODIFIERS: [&str; 2] = ["", "'"];
const PYRAMINX_FACES: [&str; 4] = ["U", "L", "R", "B"];
const PYRAMINX_TIPS: [&str; 4] = ["u", "l", "r", "b"];
const SKEWB_FACES: [&str; 4] = ["R", "U", "L", "B"];
const MEGAMINX_ROW: usize = 10;

/// Build a space-separated scramble for `mode` with `move_count` turns,
/// clamped to the configured bounds
pub fn generate_scramble<R: Rng + ?Sized>(mode: CubeMode, move_count: u32, rng: &mut R) -> String {
    let count = move_count.clamp(SCRAMBLE_MOVE_COUNT.min, SCRAMBLE_MOVE_COUNT.max) as usize;

    let moves = match mode {
        CubeMode::Two | CubeMode::Three => cuboid(&OUTER_FACES, count, rng),
        CubeMode::Four => {
            let faces: Vec<Face> = OUTER_FACES.iter().chain(&FOUR_WIDE).copied().collect();
            cuboid(&faces, count, rng)
        }
        CubeMode::Five => {
            let faces: Vec<Face> = OUTER_FACES.iter().chain(&FIVE_WIDE).copied().collect();
            cuboid(&faces, count, rng)
        }
        CubeMode::Pyraminx => pyraminx(count, rng),
        CubeMode::Skewb => corner_turns(&SKEWB_FACES, count, rng),
        CubeMode::Megaminx => megaminx(count, rng),
        CubeMode::SquareOne => square_one(count, rng),
    };

    moves.join(" ")
}

/// `generate_scramble` with the thread-local generator
pub fn random_scramble(mode: CubeMode, move_count: u32) -> String {
    generate_scramble(mode, move_count, &mut rand::thread_rng())
}

/// Face turns where no two consecutive moves share a face or an axis
fn cuboid<R: Rng + ?Sized>(faces: &[Face], count: usize, rng: &mut R) -> Vec<String> {
    let mut moves = Vec::with_capacity(count);
    let mut last: Option<Face> = None;

    for _ in 0..count {
        let (next, modifier) = loop {
            let f = faces[rng.gen_range(0..faces.len())];
            let m = CUBE_MODIFIERS[rng.gen_range(0..CUBE_MODIFIERS.len())];
            match last {
                Some(prev) if prev.name == f.name || prev.axis == f.axis => continue,
                _ => break (f, m),
            }
        };
        moves.push(format!("{}{}", next.name, modifier));
        last = Some(next);
    }

    moves
}

/// Clockwise/counter-clockwise corner turns, never repeating a face
fn corner_turns<R: Rng + ?Sized>(faces: &[&str], count: usize, rng: &mut R) -> Vec<String> {
    let mut moves = Vec::with_capacity(count);
    let mut last: Option<&str> = None;

    for _ in 0..count {
        let name = loop {
            let f = faces[rng.gen_range(0..faces.len())];
            if last != Some(f) {
                break f;
            }
        };
        let modifier = CORNER_MODIFIERS[rng.gen_range(0..CORNER_MODIFIERS.len())];
        moves.push(format!("{}{}", name, modifier));
        last = Some(name);
    }

    moves
}

fn pyraminx<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<String> {
    let mut moves = corner_turns(&PYRAMINX_FACES, count, rng);
    for tip in PYRAMINX_TIPS {
        // each tip: untouched, clockwise or counter-clockwise
        match rng.gen_range(0..3) {
            0 => {}
            1 => moves.push(tip.to_string()),
            _ => moves.push(format!("{}'", tip)),
        }
    }
    moves
}

/// Rows of alternating `R`/`D` double turns closed by a `U` turn
fn megaminx<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<String> {
    let mut moves = Vec::with_capacity(count + count / MEGAMINX_ROW + 1);
    for i in 0..count {
        let layer = if i % 2 == 0 { "R" } else { "D" };
        let dir = ["++", "--"].choose(rng).copied().unwrap_or("++");
        moves.push(format!("{}{}", layer, dir));
        if (i + 1) % MEGAMINX_ROW == 0 || i + 1 == count {
            let u = ["U", "U'"].choose(rng).copied().unwrap_or("U");
            moves.push(u.to_string());
        }
    }
    moves
}

/// `(top,bottom)` layer offsets separated by slashes; `(0,0)` is rejected
fn square_one<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<String> {
    let mut moves = Vec::with_capacity(count * 2);
    for i in 0..count {
        let (top, bottom) = loop {
            let t: i32 = rng.gen_range(-5..=6);
            let b: i32 = rng.gen_range(-5..=6);
            if t != 0 || b != 0 {
                break (t, b);
            }
        };
        if i > 0 {
            moves.push("/".to_string());
        }
        moves.push(format!("({},{})", top, bottom));
    }
    moves
}
