//! Built-in descriptors for the sop actor

use super::{CommandDescriptor, CommandSet, ParameterDescriptor};
use crate::hub::error::DescriptorResult;

/// Actor the sop commands are sent to
pub const SOP_ACTOR: &str = "sop";

fn sop(name: &str) -> CommandDescriptor {
    CommandDescriptor::new(SOP_ACTOR, name)
}

/// Every sop command, in display order
pub fn command_list() -> Vec<CommandDescriptor> {
    vec![
        sop("gotoField")
            .real_stages("slew hartmann calibs guider")
            .fake_stages("cleanup")
            .parameter(
                ParameterDescriptor::float("arcTime")
                    .units("sec")
                    .stages("calibs")
                    .help("exposure time for each arc"),
            )
            .parameter(
                ParameterDescriptor::float("flatTime")
                    .units("sec")
                    .stages("calibs")
                    .help("exposure time for each flat"),
            )
            .parameter(
                ParameterDescriptor::float("guiderFlatTime")
                    .units("sec")
                    .stages("calibs guider")
                    .help("exposure time for each guider flat"),
            )
            .parameter(
                ParameterDescriptor::float("guiderTime")
                    .units("sec")
                    .stages("guider")
                    .help("initial exposure time for guider images"),
            ),
        sop("doApogeeScience")
            .parameter(ParameterDescriptor::string("ditherSeq").default_value("AB"))
            .parameter(ParameterDescriptor::count("seqCount").default_value(2))
            .parameter(
                ParameterDescriptor::string("comment")
                    .default_value("")
                    .help("comment for FITS file"),
            )
            .parameter(
                ParameterDescriptor::float("expTime")
                    .default_value(500.0)
                    .units("sec")
                    .help("exposure time for each exposure"),
            ),
        sop("doBossScience")
            .parameter(
                ParameterDescriptor::count("nExp")
                    .default_value(0)
                    .help("number of science exposures"),
            )
            .parameter(
                ParameterDescriptor::float("expTime")
                    .units("sec")
                    .help("exposure time for each exposure"),
            ),
        sop("doMangaDither")
            .fake_stages("expose dither")
            .parameter(
                ParameterDescriptor::string("dither")
                    .default_value("N")
                    .help("Manga dither: C, N, S or E"),
            )
            .parameter(
                ParameterDescriptor::float("expTime")
                    .units("sec")
                    .default_value(900.0)
                    .help("exposure time for each exposure"),
            ),
        sop("doMangaSequence")
            .fake_stages("expose calibs dither")
            .parameter(
                ParameterDescriptor::count("count")
                    .default_value(3)
                    .help("number of repetitions of the dither sequence"),
            )
            .parameter(
                ParameterDescriptor::string("dithers")
                    .default_value("NSE")
                    .help("Manga dithers: any sequence of letters C, N, S or E"),
            )
            .parameter(
                ParameterDescriptor::float("expTime")
                    .units("sec")
                    .default_value(900.0)
                    .help("exposure time for each exposure"),
            ),
        sop("doApogeeMangaDither")
            .fake_stages("expose dither")
            .parameter(
                ParameterDescriptor::string("mangaDither")
                    .default_value("N")
                    .help("manga dither sequence"),
            )
            .parameter(
                ParameterDescriptor::float("apogeeExpTime")
                    .units("sec")
                    .default_value(450.0)
                    .help("Apogee exposure time"),
            )
            .parameter(
                ParameterDescriptor::float("mangaExpTime")
                    .units("sec")
                    .default_value(900.0)
                    .help("Manga exposure time"),
            ),
        sop("doApogeeMangaSequence")
            .fake_stages("expose calibs dither")
            .parameter(
                ParameterDescriptor::count("count")
                    .default_value(2)
                    .help("number of repetitions of the dither sequence"),
            )
            .parameter(
                ParameterDescriptor::string("mangaDithers")
                    .default_value("NSE")
                    .help("Manga dithers: any sequence of letters C, N, S or E"),
            )
            .parameter(
                ParameterDescriptor::float("apogeeExpTime")
                    .units("sec")
                    .default_value(450.0)
                    .help("Apogee exposure time"),
            )
            .parameter(
                ParameterDescriptor::float("mangaExpTime")
                    .units("sec")
                    .default_value(900.0)
                    .help("Manga exposure time"),
            ),
        sop("gotoGangChange")
            .real_stages("domeFlat slew")
            .parameter(
                ParameterDescriptor::float("alt")
                    .units("deg")
                    .stages("slew")
                    .help("desired altitude"),
            ),
        sop("gotoInstrumentChange"),
        sop("doApogeeSkyFlats")
            .parameter(
                ParameterDescriptor::string("ditherSeq")
                    .default_value("AB")
                    .help("Apogee dither sequence"),
            )
            .parameter(
                ParameterDescriptor::float("expTime")
                    .default_value(500.0)
                    .units("sec")
                    .help("exposure time for each flat"),
            ),
        sop("doApogeeDomeFlat"),
        // The calib stages are fake, so the parameters carry no stage and are always shown.
        sop("doBossCalibs")
            .fake_stages("bias dark flat arc cleanup")
            .parameter(
                ParameterDescriptor::count("nBias")
                    .default_value(0)
                    .help("number of bias exposures"),
            )
            .parameter(
                ParameterDescriptor::count("nDark")
                    .default_value(0)
                    .help("number of dark exposures"),
            )
            .parameter(
                ParameterDescriptor::count("nFlat")
                    .default_value(0)
                    .help("number of flat exposures"),
            )
            .parameter(
                ParameterDescriptor::count("nArc")
                    .default_value(0)
                    .help("number of arc exposures"),
            )
            .parameter(
                ParameterDescriptor::float("darkTime")
                    .units("sec")
                    .help("exposure time for each dark"),
            )
            .parameter(
                ParameterDescriptor::float("flatTime")
                    .units("sec")
                    .help("exposure time for each flat"),
            )
            .parameter(
                ParameterDescriptor::float("guiderFlatTime")
                    .units("sec")
                    .help("exposure time for each guider flat"),
            )
            .parameter(
                ParameterDescriptor::float("arcTime")
                    .units("sec")
                    .help("exposure time for each arc"),
            ),
        sop("gotoStow"),
    ]
}

/// The sop commands as a validated set
pub fn command_set() -> DescriptorResult<CommandSet> {
    CommandSet::load(command_list())
}
