use log::debug;

use super::{BiosError, CallRegs, Context, Outcome, CONFIG_TABLE_OFFSET};

/// Equipment word: a disk drive present, monochrome adapter.
const EQUIPMENT_DISKS_PRESENT: u16 = 1 << 0;
const EQUIPMENT_MDA_ADAPTER: u16 = 3 << 4;

/// Prints `message` and stops the machine for good.
fn halt(ctx: &mut Context<'_>, message: &str) -> Result<Outcome, BiosError> {
    ctx.console.putstr(message);
    ctx.console.putstr("\n\r\n\rHalted.\n\r");
    Err(BiosError::Halted(message.trim_end().to_string()))
}

// INT 10h - Video Services (teletype output only)
pub fn int10(ctx: &mut Context<'_>, regs: &mut CallRegs) -> Result<Outcome, BiosError> {
    if regs.ah() == 0x0E {
        ctx.console.putchar(regs.al());
        regs.set_carry(false);
    } else {
        debug!("INT 10h: unsupported AH={:02X}", regs.ah());
        regs.set_carry(true);
    }
    Ok(Outcome::Resume)
}

// INT 11h - Equipment List
pub fn int11(_ctx: &mut Context<'_>, regs: &mut CallRegs) -> Result<Outcome, BiosError> {
    regs.ax = EQUIPMENT_DISKS_PRESENT | EQUIPMENT_MDA_ADAPTER;
    Ok(Outcome::Resume)
}

// INT 14h - Serial Services
pub fn int14(_ctx: &mut Context<'_>, regs: &mut CallRegs) -> Result<Outcome, BiosError> {
    regs.set_carry(true);
    Ok(Outcome::Resume)
}

// INT 15h - System Services
pub fn int15(ctx: &mut Context<'_>, regs: &mut CallRegs) -> Result<Outcome, BiosError> {
    regs.set_carry(true);

    match regs.ah() {
        // Get system configuration parameters
        0xC0 => {
            regs.set_carry(false);
            regs.set_ah(0x80);
            regs.es = ctx.segment;
            regs.bx = CONFIG_TABLE_OFFSET;
        }
        // Wait on external event
        0x41 => regs.set_carry(false),
        // Extended memory size: none
        0x88 => {
            regs.set_carry(false);
            regs.ax = 0;
        }
        // A20 gate control is not available
        0x24 => regs.set_carry(true),
        other => debug!("INT 15h: unsupported AH={:02X}", other),
    }
    Ok(Outcome::Resume)
}

// INT 17h - Printer Services
pub fn int17(_ctx: &mut Context<'_>, regs: &mut CallRegs) -> Result<Outcome, BiosError> {
    regs.set_carry(true);
    Ok(Outcome::Resume)
}

// INT 18h - ROM BASIC
pub fn int18(ctx: &mut Context<'_>, _regs: &mut CallRegs) -> Result<Outcome, BiosError> {
    halt(ctx, "No basic services\n\r")
}

// INT 19h - Bootstrap Loader
pub fn int19(_ctx: &mut Context<'_>, _regs: &mut CallRegs) -> Result<Outcome, BiosError> {
    debug!("INT 19h: reboot");
    Ok(Outcome::Reboot)
}

// INT 1Ah - Time of Day
pub fn int1a(_ctx: &mut Context<'_>, regs: &mut CallRegs) -> Result<Outcome, BiosError> {
    regs.set_carry(true);
    Ok(Outcome::Resume)
}

// INT 1Bh - Ctrl-Break
pub fn int1b(ctx: &mut Context<'_>, _regs: &mut CallRegs) -> Result<Outcome, BiosError> {
    halt(ctx, "No break handler\n\r")
}

// INT 1Ch - Timer Tick
pub fn int1c(ctx: &mut Context<'_>, _regs: &mut CallRegs) -> Result<Outcome, BiosError> {
    halt(ctx, "No tick handler\n\r")
}
