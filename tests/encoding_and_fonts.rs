mod common;

use crate::common::{extract_first_page, reader_for, single_page_pdf, stream_body};

const TO_UNICODE_FONT: &str =
    "<< /Type /Font /Subtype /Type0 /BaseFont /Custom /ToUnicode 6 0 R >>";

fn cmap_object(body: &str) -> (u32, Vec<u8>) {
    (6, stream_body("", body.as_bytes()))
}

#[test]
fn hex_string_decodes_through_the_cmap() {
    let pdf = single_page_pdf(
        b"BT /F1 12 Tf 0 0 Td <0041> Tj ET",
        TO_UNICODE_FONT,
        &[cmap_object(
            "/CIDInit /ProcSet findresource begin\nbegincmap\n1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n1 beginbfchar\n<0041> <0061>\nendbfchar\nendcmap",
        )],
    );
    assert_eq!(extract_first_page(&reader_for(pdf)), "a");
}

#[test]
fn bfrange_maps_sequential_codes() {
    let pdf = single_page_pdf(
        b"BT /F1 12 Tf 0 0 Td <00210022> Tj ET",
        TO_UNICODE_FONT,
        &[cmap_object(
            "1 beginbfrange\n<0020> <0022> <0041>\nendbfrange",
        )],
    );
    assert_eq!(extract_first_page(&reader_for(pdf)), "BC");
}

#[test]
fn bfrange_array_maps_individual_codes() {
    let pdf = single_page_pdf(
        b"BT /F1 12 Tf 0 0 Td <00100011> Tj ET",
        TO_UNICODE_FONT,
        &[cmap_object(
            "1 beginbfrange\n<0010> <0011> [<0078> <0079>]\nendbfrange",
        )],
    );
    assert_eq!(extract_first_page(&reader_for(pdf)), "xy");
}

#[test]
fn encoding_differences_map_glyph_names() {
    let font = "<< /Type /Font /Subtype /Type1 /BaseFont /Custom /FirstChar 65 /Widths [500 500] /Encoding << /Differences [65 /alpha /fi] >> >>";
    let pdf = single_page_pdf(b"BT /F1 12 Tf 0 0 Td (AB) Tj ET", font, &[]);
    assert_eq!(extract_first_page(&reader_for(pdf)), "\u{3b1}fi");
}

#[test]
fn two_character_glyph_names_degrade_to_the_character() {
    // /7 is not a known glyph name; a two-character /x name falls back to
    // the character after the slash.
    let font = "<< /Type /Font /Subtype /Type1 /BaseFont /Custom /FirstChar 65 /Widths [500] /Encoding << /Differences [65 /7] >> >>";
    let pdf = single_page_pdf(b"BT /F1 12 Tf 0 0 Td (A) Tj ET", font, &[]);
    assert_eq!(extract_first_page(&reader_for(pdf)), "7");
}

#[test]
fn control_bytes_are_dropped_without_any_mapping() {
    let pdf = single_page_pdf(
        b"BT /F1 12 Tf 0 0 Td (A\\003B\\011C) Tj ET",
        crate::common::PLAIN_FONT,
        &[],
    );
    assert_eq!(extract_first_page(&reader_for(pdf)), "AB\tC");
}

#[test]
fn width_metrics_drive_space_synthesis() {
    // H and i are 1000/1000 em wide, so "Hi" at size 10 advances to x=20.
    // A run starting at x=21 is inside the threshold; at x=23 it is past it.
    let mut widths = String::from("[");
    for _ in 72..=105 {
        widths.push_str("1000 ");
    }
    widths.push(']');
    let font = format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Custom /FirstChar 72 /Widths {} >>",
        widths
    );

    let pdf = single_page_pdf(
        b"BT /F1 10 Tf 0 0 Td (Hi) Tj 21 0 Td (ho) Tj ET",
        &font,
        &[],
    );
    assert_eq!(extract_first_page(&reader_for(pdf)), "Hiho");

    let pdf = single_page_pdf(
        b"BT /F1 10 Tf 0 0 Td (Hi) Tj 23 0 Td (ho) Tj ET",
        &font,
        &[],
    );
    assert_eq!(extract_first_page(&reader_for(pdf)), "Hi ho");
}

#[test]
fn font_survives_graphics_state_push_and_pop() {
    let pdf = single_page_pdf(
        b"q BT /F1 12 Tf 0 0 Td (one) Tj ET Q BT 0 0 Td (two) Tj ET",
        crate::common::PLAIN_FONT,
        &[],
    );
    // Text state is not part of the q/Q stack; the font assignment persists.
    assert_eq!(extract_first_page(&reader_for(pdf)), "onetwo");
}
